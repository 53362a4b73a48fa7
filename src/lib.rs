//! Mobility Engine - On-device trip segmentation and transport-mode classification
//!
//! The engine turns one day of raw phone sensor samples (location fixes,
//! activity transitions, step counts, heart rate) into a list of trips, each
//! labelled with a transportation mode, plus daily per-mode totals, through a
//! deterministic pipeline: sample collection → chart building → location
//! cleaning → segmentation → correction → reclassification → compaction.
//!
//! ## Modules
//!
//! - **Collection**: Sample store trait, in-memory buffers and window reads
//! - **Chart**: Per-timestamp slices merged from every sensor
//! - **Trips**: Segmentation, correction heuristics and daily summary

pub mod chart;
pub mod cleaner;
pub mod collector;
pub mod compactor;
pub mod config;
pub mod corrector;
pub mod error;
pub mod finaliser;
pub mod geometry;
pub mod pipeline;
pub mod reclassifier;
pub mod segmenter;
pub mod summary;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

#[cfg(test)]
mod testutil;

pub use collector::{BufferConfig, MemoryStore, SampleBuffers, SampleCollector, SampleStore};
pub use config::{EngineConfig, Thresholds};
pub use error::ComputeError;
pub use pipeline::{compute_day_json, MobilityEngine};
pub use types::{
    ActivityTransition, ActivityType, Chart, DailySummary, DayResult, DaySamples, Location,
    TimeSlice, Trip,
};

/// Engine version embedded in CLI and FFI output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
