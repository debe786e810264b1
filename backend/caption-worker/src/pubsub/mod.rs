//! Redis pub/sub integration
//!
//! - Dispatcher: consumes the channel and fans records out to enrichment tasks
//! - Broker: publishes enriched and dead-lettered records
//! - Events: channel message schemas

pub mod broker;
pub mod dispatcher;
pub mod events;

pub use broker::{publish_metadata, send_to_dead_letter, Publisher, RedisBroker, SharedPublisher};
pub use dispatcher::{DispatcherConfig, MessageDispatcher, Skipped};
pub use events::{DeadLetterEvent, PhotoMetadata, CAPTION_FIELD};
