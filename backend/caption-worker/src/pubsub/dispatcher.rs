//! Message dispatcher
//!
//! Decodes each inbound payload, applies the idempotency gate and hands
//! uncaptioned records to a bounded set of enrichment tasks.

use crate::error::WorkerError;
use crate::pubsub::broker::{send_to_dead_letter, SharedPublisher};
use crate::pubsub::events::{DeadLetterEvent, PhotoMetadata};
use crate::services::{Enricher, EnrichmentOutcome, InFlightRegistry};
use crate::stats::{DispatchStats, StatsCollector};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Channel the messages come from, recorded on dead letters
    pub channel: String,
    /// Maximum enrichment tasks running at once
    pub max_in_flight: usize,
    /// Where failed records go; dropped when `None`
    pub dead_letter_channel: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel: "queue".to_string(),
            max_in_flight: 64,
            dead_letter_channel: None,
        }
    }
}

/// Why a payload was not handed to an enrichment task
#[derive(Debug)]
pub enum Skipped {
    Undecodable(WorkerError),
    AlreadyCaptioned,
    InFlight,
    /// The dispatcher was shut down
    Closed,
}

/// Routes inbound messages to enrichment tasks
pub struct MessageDispatcher {
    config: DispatcherConfig,
    enricher: Arc<Enricher>,
    publisher: SharedPublisher,
    in_flight: InFlightRegistry,
    permits: Arc<Semaphore>,
    stats: StatsCollector,
}

impl MessageDispatcher {
    pub fn new(
        config: DispatcherConfig,
        enricher: Arc<Enricher>,
        publisher: SharedPublisher,
    ) -> Self {
        let max_in_flight = config.max_in_flight.clamp(1, u32::MAX as usize);
        let config = DispatcherConfig {
            max_in_flight,
            ..config
        };

        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
            config,
            enricher,
            publisher,
            in_flight: InFlightRegistry::new(),
            stats: StatsCollector::new(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.snapshot()
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Consume messages until the stream ends, then wait for running tasks
    pub async fn run<S>(&self, mut messages: S) -> DispatchStats
    where
        S: Stream<Item = String> + Unpin,
    {
        info!(
            channel = %self.config.channel,
            max_in_flight = self.config.max_in_flight,
            "Starting dispatch loop"
        );

        while let Some(payload) = messages.next().await {
            // Other skips are already logged and counted
            if let Err(Skipped::Closed) = self.dispatch(payload).await {
                info!(channel = %self.config.channel, "Dispatcher closed, leaving dispatch loop");
                return self.stats();
            }
        }

        warn!(channel = %self.config.channel, "Message stream ended");
        self.drain().await;

        self.stats()
    }

    /// Handle one payload
    ///
    /// Waits for a free worker slot when `max_in_flight` tasks are running,
    /// which holds back the intake loop.
    pub async fn dispatch(&self, payload: String) -> Result<JoinHandle<()>, Skipped> {
        self.stats.record_received();
        debug!(channel = %self.config.channel, payload = %payload, "Got message");

        let metadata = match PhotoMetadata::from_payload(&payload) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, payload = %payload, "Couldn't decode photo metadata");
                self.stats.record_decode_failure();
                return Err(Skipped::Undecodable(e.into()));
            }
        };

        if !metadata.needs_caption() {
            debug!(photo_id = %metadata.photo_id, "Record already captioned, skipping");
            self.stats.record_skipped_captioned();
            return Err(Skipped::AlreadyCaptioned);
        }

        let Some(guard) = self.in_flight.try_acquire(&metadata.photo_id) else {
            info!(
                photo_id = %metadata.photo_id,
                "Enrichment already in flight for photo, dropping duplicate"
            );
            self.stats.record_skipped_in_flight();
            return Err(Skipped::InFlight);
        };

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(photo_id = %metadata.photo_id, "Worker pool closed, dropping record");
                return Err(Skipped::Closed);
            }
        };

        let enricher = Arc::clone(&self.enricher);
        let publisher = Arc::clone(&self.publisher);
        let stats = self.stats.clone();
        let channel = self.config.channel.clone();
        let dead_letter_channel = self.config.dead_letter_channel.clone();

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let _permit = permit;

            match enricher.enrich(metadata.clone()).await {
                Ok(EnrichmentOutcome::Enriched(report)) => {
                    stats.record_enriched(report.is_complete());
                }
                Ok(EnrichmentOutcome::FromStore(report)) => {
                    stats.record_from_store(report.is_complete());
                }
                Ok(EnrichmentOutcome::AlreadyCaptioned { .. }) => {
                    stats.record_skipped_captioned();
                }
                Err(e) => {
                    stats.record_failed();

                    let Some(dead_letter_channel) = dead_letter_channel else {
                        return;
                    };

                    let event = DeadLetterEvent::new(metadata, &channel, &e.to_string());
                    match send_to_dead_letter(publisher.as_ref(), &dead_letter_channel, &event)
                        .await
                    {
                        Ok(_) => stats.record_dead_lettered(),
                        Err(dlq_err) => {
                            error!(
                                photo_id = %event.original_event.photo_id,
                                error = %dlq_err,
                                "Failed to send record to dead-letter channel"
                            );
                        }
                    }
                }
            }
        }))
    }

    /// Wait until every running enrichment task has finished
    pub async fn drain(&self) {
        let all = self.config.max_in_flight as u32;
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }

    /// Wait for running tasks, then refuse every later payload with `Skipped::Closed`
    pub async fn shutdown(&self) {
        self.drain().await;
        self.permits.close();
        info!(channel = %self.config.channel, "Dispatcher shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
