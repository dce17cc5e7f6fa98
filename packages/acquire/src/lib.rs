#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable, parallel satellite tile acquisition.
//!
//! The [`orchestrator::Orchestrator`] walks the candidate points region by
//! region, splits each region into shards with [`partition::partition`],
//! and hands the shards to a [`pool::WorkerPool`]. Each
//! [`worker::Worker`] exports one GeoTIFF per point through an
//! [`imagery::ImageryService`], skipping tiles that already exist.

pub mod config;
pub mod imagery;
pub mod orchestrator;
pub mod partition;
pub mod pool;
pub mod tile;
pub mod worker;

pub use config::{AcquisitionConfig, ConfigError, EarthEngineCredentials};
pub use imagery::{EarthEngineClient, ImageryError, ImageryService};
pub use orchestrator::{AcquisitionSummary, Orchestrator, RegionAcquisition};
pub use partition::PartitionError;
pub use pool::{InProcessPool, ProcessPool, ShardJob, WorkerPool};
pub use worker::{Shard, ShardReport, Worker};

/// Errors that abort an acquisition run (or one region of it).
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sharding failed.
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// The imagery client could not be set up.
    #[error("Imagery error: {0}")]
    Imagery(#[from] ImageryError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shard job or report (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker process could not be started.
    #[error("Worker process error: {message}")]
    Process {
        /// Description of what went wrong.
        message: String,
    },
}
