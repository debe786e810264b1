//! Caption Worker - captions photos announced on a Redis channel
//!
//! This service provides:
//! - Redis pub/sub intake of photo metadata records
//! - Image download and upload to an external captioning API
//! - Caption storage in a Redis hash keyed by photo id
//! - Republishing of the captioned record for downstream consumers
//!
//! Raw and captioned records travel on the same channel. A record with a
//! non-empty `caption` is never enriched again, which is what stops the
//! worker from consuming its own output forever.

pub mod config;
pub mod error;
pub mod providers;
pub mod pubsub;
pub mod services;
pub mod stats;
pub mod store;

pub use config::Config;
pub use error::{Result, WorkerError};
pub use providers::{CaptionApiClient, CaptionApiResponse, Captioner, SharedCaptioner};
pub use pubsub::{
    DeadLetterEvent, DispatcherConfig, MessageDispatcher, PhotoMetadata, Publisher, RedisBroker,
    SharedPublisher, Skipped,
};
pub use services::{Enricher, EnrichmentOutcome, EnrichmentReport, InFlightRegistry};
pub use stats::DispatchStats;
pub use store::{KeyValueStore, RedisStore, SharedStore};
