#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Source adapters and normalization logic.
//!
//! Each input dataset has an adapter that reads its raw format and
//! produces canonical [`GeoPoint`](wwtp_point_models::GeoPoint) records
//! plus an [`AdapterReport`] of what was kept and what was dropped.
//! Rows that fail to parse are counted, never raised.

pub mod candidate;
pub mod community;
pub mod export;
pub mod hydro;
pub mod overpass;
pub mod parsing;
pub mod progress;
pub mod regulatory;
pub mod retry;

use wwtp_point_models::PointSource;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a failing status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data normalization error.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// Per-run counters for one adapter.
///
/// Every row read ends up in exactly one bucket, so
/// `kept + malformed + filtered + ambiguous + duplicates == read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterReport {
    /// Dataset the adapter reads.
    pub source: PointSource,
    /// Rows (or features) read from the input.
    pub read: u64,
    /// Points emitted.
    pub kept: u64,
    /// Rows without a usable coordinate pair or geometry.
    pub malformed: u64,
    /// Rows outside the adapter's scope (wrong country or category).
    pub filtered: u64,
    /// Points that fell in zero or several regions.
    pub ambiguous: u64,
    /// Exact duplicates and repeated ids.
    pub duplicates: u64,
}

impl AdapterReport {
    /// Creates an empty report for a source.
    #[must_use]
    pub const fn new(source: PointSource) -> Self {
        Self {
            source,
            read: 0,
            kept: 0,
            malformed: 0,
            filtered: 0,
            ambiguous: 0,
            duplicates: 0,
        }
    }

    /// Total rows dropped for any reason.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.malformed + self.filtered + self.ambiguous + self.duplicates
    }

    /// Writes the counters to the log.
    pub fn log(&self) {
        log::info!(
            "[{}] read {} rows: kept {}, malformed {}, filtered {}, ambiguous region {}, duplicates {}",
            self.source,
            self.read,
            self.kept,
            self.malformed,
            self.filtered,
            self.ambiguous,
            self.duplicates,
        );
    }
}
