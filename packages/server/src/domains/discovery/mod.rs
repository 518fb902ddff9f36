//! Discovery domain - the live-discovery orchestration core.
//!
//! A discovery job searches a geographic area for food pantries,
//! deduplicates candidates against the record store, runs new candidates
//! through the ingestion pipeline under a concurrency bound and a
//! wall-clock deadline, and streams ordered progress events to the client.

pub mod dedup;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod validator;

pub use dedup::{partition_candidates, DedupOutcome, FRESHNESS_HOURS};
pub use events::DiscoveryEvent;
pub use models::{DiscoveryJob, DiscoveryStatus, PlaceCandidate};
pub use pipeline::{IngestionError, IngestionPipeline, Stage};
pub use registry::JobRegistry;
pub use service::{DiscoveryConfig, DiscoveryService};
pub use validator::{validate_extraction, ValidationError};
