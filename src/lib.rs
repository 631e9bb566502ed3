//! Road-condition telemetry: an edge agent that aligns accelerometer and GPS
//! recordings, classifies and batches them, and a store that persists batches
//! and pushes them to live per-user subscribers.

pub mod agent;
pub mod aggregator;
pub mod alignment;
pub mod broadcaster;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod live_status;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod sensors;
pub mod server;
pub mod smoothing;
pub mod storage;
pub mod transport;
pub mod types;

pub use agent::Agent;
pub use error::{Result, RoadTrackerError};
pub use types::{
    ClassifiedSample, PersistedRecord, RawAccelSample, RawGpsFix, UnifiedSample, UserId,
};
