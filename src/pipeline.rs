//! Pipeline orchestration
//!
//! This module provides the public API of the mobility engine. It runs one day
//! of raw sensor samples through chart building, cleaning, segmentation,
//! correction, reclassification and compaction.

use crate::chart::ChartBuilder;
use crate::cleaner::LocationCleaner;
use crate::collector::{SampleBuffers, SampleCollector, SampleStore};
use crate::compactor::TripCompactor;
use crate::config::EngineConfig;
use crate::corrector::TripCorrector;
use crate::error::ComputeError;
use crate::finaliser::LocationFinaliser;
use crate::reclassifier::SuspiciousTripReclassifier;
use crate::segmenter::TripSegmenter;
use crate::summary::SummaryAggregator;
use crate::types::{Chart, DailySummary, DayResult, DaySamples, Trip};
use chrono::Utc;
use uuid::Uuid;

/// Compute the mobility result for a day given as JSON samples.
///
/// # Arguments
/// * `samples_json` - A serialized [`DaySamples`] (window plus sample sequences)
/// * `compute_chart` - Whether to segment and classify trips
///
/// # Returns
/// The serialized [`DayResult`]
///
/// # Example
/// ```ignore
/// let result_json = compute_day_json(
///     r#"{"start_time": 0, "end_time": 86400000, "locations": []}"#,
///     true,
/// )?;
/// ```
pub fn compute_day_json(samples_json: &str, compute_chart: bool) -> Result<String, ComputeError> {
    let samples = DaySamples::from_json(samples_json)?;
    let result = MobilityEngine::new().compute_samples(samples, compute_chart)?;
    serde_json::to_string(&result).map_err(|e| ComputeError::EncodingError(e.to_string()))
}

/// Day computation engine.
///
/// Holds only configuration; every computation builds its own chart and trip
/// list, so one engine can serve any number of days.
#[derive(Debug, Clone, Default)]
pub struct MobilityEngine {
    config: EngineConfig,
}

impl MobilityEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flush pending samples into `store`, then compute the window `[start, end)`
    pub fn compute_day(
        &self,
        store: &mut dyn SampleStore,
        buffers: &mut SampleBuffers,
        start: i64,
        end: i64,
        compute_chart: bool,
    ) -> Result<DayResult, ComputeError> {
        let samples = SampleCollector::collect(store, buffers, start, end)?;
        self.compute_samples(samples, compute_chart)
    }

    /// Compute the result for an already collected day
    pub fn compute_samples(
        &self,
        samples: DaySamples,
        compute_chart: bool,
    ) -> Result<DayResult, ComputeError> {
        samples.validate()?;

        let (trips, summary, chart) = if compute_chart {
            let (chart, trips, summary) = self.compute_trips(&samples);
            (Some(trips), Some(summary), Some(chart))
        } else {
            (None, None, None)
        };

        Ok(DayResult {
            computation_id: Uuid::new_v4().to_string(),
            computed_at: Utc::now(),
            start_time: samples.start_time,
            end_time: samples.end_time,
            activities: samples.activities,
            batteries: samples.batteries,
            heart_rates: samples.heart_rates,
            locations: samples.locations,
            steps: samples.steps,
            trips,
            summary,
            chart,
        })
    }

    /// Build the chart and run every trip stage over it.
    ///
    /// Pipeline stages:
    /// 1. ChartBuilder - Merge samples into time slices
    /// 2. LocationCleaner - Drop spikes, cluster stay points, simplify
    /// 3. TripSegmenter - Cut the chart at activity transitions
    /// 4. TripCorrector - Repair known misclassification patterns
    /// 5. SuspiciousTripReclassifier - Demote implausible trips
    /// 6. TripCompactor - Merge adjacent same-mode trips
    /// 7. LocationFinaliser - Centroid still trips, annotate slices
    /// 8. SummaryAggregator - Final per-mode totals
    pub fn compute_trips(&self, samples: &DaySamples) -> (Chart, Vec<Trip>, DailySummary) {
        // Stage 1: Build the chart
        let mut chart = ChartBuilder::build(samples);

        // Stage 2: Clean locations
        LocationCleaner::new(&self.config).clean(&mut chart);

        // Stage 3: Segment into trips
        let trips = TripSegmenter::segment(&chart);

        // Stage 4: Correct
        let trips = TripCorrector::new(&chart, &self.config).correct(trips);

        // Stage 5: Reclassify suspicious trips
        let trips = SuspiciousTripReclassifier::new(&self.config).reclassify(trips);

        // Stage 6: Compact
        let mut trips = TripCompactor::compact(trips);

        // Stage 7: Finalise locations
        LocationFinaliser::finalise(&mut chart, &mut trips, self.config.use_stay_points);

        // Stage 8: Summarize
        let summary = SummaryAggregator::summarize(&trips);

        log::debug!(
            "Computed {} trips over {} slices for window [{}, {})",
            trips.len(),
            chart.len(),
            samples.start_time,
            samples.end_time
        );

        (chart, trips, summary)
    }
}
