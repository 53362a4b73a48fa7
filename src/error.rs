//! Error types for the mobility engine

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid day window: end {end} must be after start {start}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("Unsorted {kind} samples: timestamp at index {index} goes backwards")]
    UnsortedSamples { kind: &'static str, index: usize },

    #[error("Sample store error: {0}")]
    Store(String),

    #[error("Failed to parse day samples: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
