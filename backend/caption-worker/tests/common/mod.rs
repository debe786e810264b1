//! In-memory collaborators for pipeline tests
#![allow(dead_code)]

use async_trait::async_trait;
use caption_worker::{
    Captioner, DispatcherConfig, Enricher, KeyValueStore, MessageDispatcher, Publisher,
    Result, SharedPublisher, WorkerError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hash store backed by a map
#[derive(Default)]
pub struct InMemoryStore {
    fields: Mutex<HashMap<(String, String), String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_writes() -> Arc<Self> {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    /// Store holding one field up front; the seed does not count as a write
    pub fn with_field(key: &str, field: &str, value: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .fields
            .lock()
            .unwrap()
            .insert((key.to_string(), field.to_string()), value.to_string());
        Arc::new(store)
    }

    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.fields
            .lock()
            .unwrap()
            .get(&(key.to_string(), field.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.field(key, field))
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WorkerError::Persist("store unavailable".to_string()));
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        self.fields
            .lock()
            .unwrap()
            .insert((key.to_string(), field.to_string()), value.to_string());
        Ok(())
    }
}

/// Publisher that records every message
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn payloads_on(&self, channel: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(1)
    }
}

/// Captioner returning a fixed answer, counting calls and peak concurrency
pub struct FakeCaptioner {
    answer: std::result::Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCaptioner {
    pub fn captioning(caption: &str) -> Arc<Self> {
        Self::build(Ok(caption.to_string()), Duration::ZERO)
    }

    pub fn failing(err: &str) -> Arc<Self> {
        Self::build(Err(err.to_string()), Duration::ZERO)
    }

    pub fn slow(caption: &str, delay: Duration) -> Arc<Self> {
        Self::build(Ok(caption.to_string()), delay)
    }

    fn build(answer: std::result::Result<String, String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Captioner for FakeCaptioner {
    async fn caption(&self, _photo_url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.answer.clone().map_err(WorkerError::Api)
    }
}

/// Everything a pipeline test needs to inspect
pub struct Pipeline {
    pub dispatcher: MessageDispatcher,
    pub captioner: Arc<FakeCaptioner>,
    pub store: Arc<InMemoryStore>,
    pub publisher: Arc<RecordingPublisher>,
}

pub const CHANNEL: &str = "queue";

pub fn pipeline(
    captioner: Arc<FakeCaptioner>,
    store: Arc<InMemoryStore>,
    config: DispatcherConfig,
) -> Pipeline {
    let publisher = RecordingPublisher::new();
    let shared_publisher: SharedPublisher = publisher.clone();

    let enricher = Enricher::new(
        captioner.clone(),
        store.clone(),
        shared_publisher.clone(),
        CHANNEL,
    );

    let dispatcher = MessageDispatcher::new(
        DispatcherConfig {
            channel: CHANNEL.to_string(),
            ..config
        },
        Arc::new(enricher),
        shared_publisher,
    );

    Pipeline {
        dispatcher,
        captioner,
        store,
        publisher,
    }
}
