//! Caption worker business logic

pub mod enricher;
pub mod single_flight;

pub use enricher::{Enricher, EnrichmentOutcome, EnrichmentReport};
pub use single_flight::{InFlightGuard, InFlightRegistry};
