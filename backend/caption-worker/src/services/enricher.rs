//! Enrichment of a single photo record
//!
//! Steps, in order:
//! 1. if the keyed store already holds a caption for the photo, apply it to
//!    the record and publish without calling the API or writing the store
//! 2. caption the photo (a failure here drops the record: nothing is stored or published)
//! 3. store the caption under `photo_id` / `caption`
//! 4. publish the enriched record to the output channel
//!
//! Steps 3 and 4 are best-effort and independent: a failed store write does
//! not stop the publish, and neither is rolled back. The report records both.

use crate::error::{Result, WorkerError};
use crate::providers::SharedCaptioner;
use crate::pubsub::broker::{publish_metadata, SharedPublisher};
use crate::pubsub::events::{PhotoMetadata, CAPTION_FIELD};
use crate::store::SharedStore;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of a successful caption call and the follow-up writes
#[derive(Debug)]
pub struct EnrichmentReport {
    /// The record as published, caption filled in
    pub metadata: PhotoMetadata,
    pub persist_error: Option<WorkerError>,
    pub publish_error: Option<WorkerError>,
}

impl EnrichmentReport {
    /// Both the store write and the publish succeeded
    pub fn is_complete(&self) -> bool {
        self.persist_error.is_none() && self.publish_error.is_none()
    }
}

#[derive(Debug)]
pub enum EnrichmentOutcome {
    Enriched(EnrichmentReport),
    /// The caption came from the store; only the publish was attempted
    FromStore(EnrichmentReport),
    /// The record already carries a caption
    AlreadyCaptioned { photo_id: String, caption: String },
}

/// Orchestrates caption, persist and republish for one record
pub struct Enricher {
    captioner: SharedCaptioner,
    store: SharedStore,
    publisher: SharedPublisher,
    output_channel: String,
}

impl Enricher {
    pub fn new(
        captioner: SharedCaptioner,
        store: SharedStore,
        publisher: SharedPublisher,
        output_channel: impl Into<String>,
    ) -> Self {
        Self {
            captioner,
            store,
            publisher,
            output_channel: output_channel.into(),
        }
    }

    pub fn output_channel(&self) -> &str {
        &self.output_channel
    }

    /// Enrich one record
    ///
    /// Returns an error only when no caption was produced; in that case nothing
    /// was written or published.
    pub async fn enrich(&self, metadata: PhotoMetadata) -> Result<EnrichmentOutcome> {
        if !metadata.needs_caption() {
            return Ok(EnrichmentOutcome::AlreadyCaptioned {
                photo_id: metadata.photo_id,
                caption: metadata.caption,
            });
        }

        let start_time = Instant::now();

        match self.store.get_field(&metadata.photo_id, CAPTION_FIELD).await {
            Ok(Some(caption)) if !caption.is_empty() => {
                info!(
                    photo_id = %metadata.photo_id,
                    "Caption already stored, republishing without API call"
                );
                let metadata = metadata.with_caption(caption);
                let publish_error = self.publish(&metadata).await;

                return Ok(EnrichmentOutcome::FromStore(EnrichmentReport {
                    metadata,
                    persist_error: None,
                    publish_error,
                }));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    photo_id = %metadata.photo_id,
                    error = %e,
                    "Stored caption lookup failed, enriching anyway"
                );
            }
        }

        let caption = self
            .captioner
            .caption(&metadata.photo_url)
            .await
            .map_err(|e| {
                error!(
                    photo_id = %metadata.photo_id,
                    photo_url = %metadata.photo_url,
                    error = %e,
                    "Couldn't get caption from API"
                );
                e
            })?;

        let metadata = metadata.with_caption(caption);

        let persist_error = match self
            .store
            .set_field(&metadata.photo_id, CAPTION_FIELD, &metadata.caption)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                error!(
                    photo_id = %metadata.photo_id,
                    error = %e,
                    "Couldn't store caption"
                );
                Some(e)
            }
        };

        let publish_error = self.publish(&metadata).await;

        info!(
            photo_id = %metadata.photo_id,
            persisted = persist_error.is_none(),
            published = publish_error.is_none(),
            processing_time_ms = start_time.elapsed().as_millis() as u64,
            "Enrichment complete"
        );

        Ok(EnrichmentOutcome::Enriched(EnrichmentReport {
            metadata,
            persist_error,
            publish_error,
        }))
    }

    async fn publish(&self, metadata: &PhotoMetadata) -> Option<WorkerError> {
        match publish_metadata(self.publisher.as_ref(), &self.output_channel, metadata).await {
            Ok(receivers) => {
                debug!(
                    photo_id = %metadata.photo_id,
                    channel = %self.output_channel,
                    receivers = receivers,
                    "Published enriched record"
                );
                None
            }
            Err(e) => {
                error!(
                    photo_id = %metadata.photo_id,
                    channel = %self.output_channel,
                    error = %e,
                    "Couldn't publish enriched record"
                );
                Some(e)
            }
        }
    }
}
