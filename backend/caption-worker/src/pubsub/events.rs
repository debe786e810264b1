//! Pub/sub message schemas
//!
//! Raw and enriched records share one channel and one schema. The only
//! difference between them is whether `caption` is empty.

use serde::{Deserialize, Serialize};

/// Hash field holding the caption under each `photo_id` key
pub const CAPTION_FIELD: &str = "caption";

/// Photo metadata record carried on the channel
///
/// Missing fields decode to their zero values so partial upstream records are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoMetadata {
    pub chat_id: i64,
    pub photo_url: String,
    /// Empty until the worker has captioned the photo
    pub caption: String,
    pub styled_url: String,
    pub published: bool,
    pub photo_id: String,
}

impl PhotoMetadata {
    /// Decode a channel payload
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Encode for publishing
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether this record still needs a caption
    pub fn needs_caption(&self) -> bool {
        self.caption.is_empty()
    }

    /// Return a copy carrying the given caption
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }
}

/// Record published to the dead-letter channel when enrichment fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    pub original_event: PhotoMetadata,
    pub source_channel: String,
    pub error: String,
    /// Unix timestamp in milliseconds
    pub failed_at: i64,
}

impl DeadLetterEvent {
    pub fn new(original_event: PhotoMetadata, source_channel: &str, error: &str) -> Self {
        Self {
            original_event,
            source_channel: source_channel.to_string(),
            error: error.to_string(),
            failed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
