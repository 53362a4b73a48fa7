//! Sample collection
//!
//! The engine's only external input. A [`SampleStore`] holds persisted samples;
//! [`SampleBuffers`] holds samples the sensor monitors have not flushed yet.
//! Collecting a window flushes the buffers into the store, then reads the
//! window back, so the day always sees every sample taken so far.

use crate::error::ComputeError;
use crate::types::{
    ActivityTransition, BatterySample, DaySamples, HeartRateSample, Location, StepSample,
};
use serde::{Deserialize, Serialize};

/// Default number of buffered samples per sensor before a flush is due
pub const DEFAULT_BUFFER_SIZE: usize = 50;

/// Persistent sample storage, read by half-open time window `[start, end)`
pub trait SampleStore {
    fn locations_between(&self, start: i64, end: i64) -> Result<Vec<Location>, ComputeError>;
    fn steps_between(&self, start: i64, end: i64) -> Result<Vec<StepSample>, ComputeError>;
    fn activities_between(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<ActivityTransition>, ComputeError>;
    fn heart_rates_between(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<HeartRateSample>, ComputeError>;
    fn batteries_between(&self, start: i64, end: i64)
        -> Result<Vec<BatterySample>, ComputeError>;

    fn append_locations(&mut self, samples: Vec<Location>) -> Result<(), ComputeError>;
    fn append_steps(&mut self, samples: Vec<StepSample>) -> Result<(), ComputeError>;
    fn append_activities(&mut self, samples: Vec<ActivityTransition>)
        -> Result<(), ComputeError>;
    fn append_heart_rates(&mut self, samples: Vec<HeartRateSample>) -> Result<(), ComputeError>;
    fn append_batteries(&mut self, samples: Vec<BatterySample>) -> Result<(), ComputeError>;
}

/// Samples that carry a timestamp
pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

macro_rules! impl_timestamped {
    ($($ty:ty),*) => {
        $(impl Timestamped for $ty {
            fn timestamp(&self) -> i64 {
                self.timestamp
            }
        })*
    };
}

impl_timestamped!(Location, StepSample, ActivityTransition, HeartRateSample, BatterySample);

/// Insert `samples` into an already sorted vector, keeping it sorted
fn merge_sorted<T: Timestamped>(target: &mut Vec<T>, samples: Vec<T>) {
    target.extend(samples);
    // Stable, so samples sharing a timestamp keep arrival order
    target.sort_by_key(|s| s.timestamp());
}

fn window<T: Timestamped + Clone>(samples: &[T], start: i64, end: i64) -> Vec<T> {
    let from = samples.partition_point(|s| s.timestamp() < start);
    let to = samples.partition_point(|s| s.timestamp() < end);
    samples[from..to.max(from)].to_vec()
}

/// Reference in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    locations: Vec<Location>,
    steps: Vec<StepSample>,
    activities: Vec<ActivityTransition>,
    heart_rates: Vec<HeartRateSample>,
    batteries: Vec<BatterySample>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding every sample in `samples`
    pub fn from_samples(samples: DaySamples) -> Self {
        let mut store = Self::new();
        merge_sorted(&mut store.locations, samples.locations);
        merge_sorted(&mut store.steps, samples.steps);
        merge_sorted(&mut store.activities, samples.activities);
        merge_sorted(&mut store.heart_rates, samples.heart_rates);
        merge_sorted(&mut store.batteries, samples.batteries);
        store
    }

    pub fn len(&self) -> usize {
        self.locations.len()
            + self.steps.len()
            + self.activities.len()
            + self.heart_rates.len()
            + self.batteries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleStore for MemoryStore {
    fn locations_between(&self, start: i64, end: i64) -> Result<Vec<Location>, ComputeError> {
        Ok(window(&self.locations, start, end))
    }

    fn steps_between(&self, start: i64, end: i64) -> Result<Vec<StepSample>, ComputeError> {
        Ok(window(&self.steps, start, end))
    }

    fn activities_between(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<ActivityTransition>, ComputeError> {
        Ok(window(&self.activities, start, end))
    }

    fn heart_rates_between(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<HeartRateSample>, ComputeError> {
        Ok(window(&self.heart_rates, start, end))
    }

    fn batteries_between(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<BatterySample>, ComputeError> {
        Ok(window(&self.batteries, start, end))
    }

    fn append_locations(&mut self, samples: Vec<Location>) -> Result<(), ComputeError> {
        merge_sorted(&mut self.locations, samples);
        Ok(())
    }

    fn append_steps(&mut self, samples: Vec<StepSample>) -> Result<(), ComputeError> {
        merge_sorted(&mut self.steps, samples);
        Ok(())
    }

    fn append_activities(
        &mut self,
        samples: Vec<ActivityTransition>,
    ) -> Result<(), ComputeError> {
        merge_sorted(&mut self.activities, samples);
        Ok(())
    }

    fn append_heart_rates(&mut self, samples: Vec<HeartRateSample>) -> Result<(), ComputeError> {
        merge_sorted(&mut self.heart_rates, samples);
        Ok(())
    }

    fn append_batteries(&mut self, samples: Vec<BatterySample>) -> Result<(), ComputeError> {
        merge_sorted(&mut self.batteries, samples);
        Ok(())
    }
}

/// Flush policy for the in-memory sample buffers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Buffered samples per sensor before a flush is due
    pub max_size: usize,
    /// Flush after every sample (the app is in the foreground)
    pub keep_flushing: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_BUFFER_SIZE,
            keep_flushing: false,
        }
    }
}

/// Samples taken by the sensor monitors but not yet persisted
#[derive(Debug, Clone, Default)]
pub struct SampleBuffers {
    config: BufferConfig,
    locations: Vec<Location>,
    steps: Vec<StepSample>,
    activities: Vec<ActivityTransition>,
    heart_rates: Vec<HeartRateSample>,
    batteries: Vec<BatterySample>,
}

impl SampleBuffers {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn set_keep_flushing(&mut self, keep_flushing: bool) {
        self.config.keep_flushing = keep_flushing;
    }

    pub fn push_location(&mut self, sample: Location) -> bool {
        self.locations.push(sample);
        self.due(self.locations.len())
    }

    pub fn push_steps(&mut self, sample: StepSample) -> bool {
        self.steps.push(sample);
        self.due(self.steps.len())
    }

    pub fn push_activity(&mut self, sample: ActivityTransition) -> bool {
        self.activities.push(sample);
        self.due(self.activities.len())
    }

    pub fn push_heart_rate(&mut self, sample: HeartRateSample) -> bool {
        self.heart_rates.push(sample);
        self.due(self.heart_rates.len())
    }

    pub fn push_battery(&mut self, sample: BatterySample) -> bool {
        self.batteries.push(sample);
        self.due(self.batteries.len())
    }

    /// Whether any sensor buffer has reached its flush point
    pub fn should_flush(&self) -> bool {
        [
            self.locations.len(),
            self.steps.len(),
            self.activities.len(),
            self.heart_rates.len(),
            self.batteries.len(),
        ]
        .into_iter()
        .any(|len| self.due(len))
    }

    fn due(&self, len: usize) -> bool {
        if self.config.keep_flushing {
            len > 0
        } else {
            len >= self.config.max_size
        }
    }

    pub fn drain_locations(&mut self) -> Vec<Location> {
        std::mem::take(&mut self.locations)
    }

    pub fn drain_steps(&mut self) -> Vec<StepSample> {
        std::mem::take(&mut self.steps)
    }

    pub fn drain_activities(&mut self) -> Vec<ActivityTransition> {
        std::mem::take(&mut self.activities)
    }

    pub fn drain_heart_rates(&mut self) -> Vec<HeartRateSample> {
        std::mem::take(&mut self.heart_rates)
    }

    pub fn drain_batteries(&mut self) -> Vec<BatterySample> {
        std::mem::take(&mut self.batteries)
    }

    /// Write every buffered sample to `store`, leaving the buffers empty
    pub fn flush_into(&mut self, store: &mut dyn SampleStore) -> Result<usize, ComputeError> {
        let mut flushed = 0;

        let locations = self.drain_locations();
        flushed += locations.len();
        store.append_locations(locations)?;

        let steps = self.drain_steps();
        flushed += steps.len();
        store.append_steps(steps)?;

        let activities = self.drain_activities();
        flushed += activities.len();
        store.append_activities(activities)?;

        let heart_rates = self.drain_heart_rates();
        flushed += heart_rates.len();
        store.append_heart_rates(heart_rates)?;

        let batteries = self.drain_batteries();
        flushed += batteries.len();
        store.append_batteries(batteries)?;

        Ok(flushed)
    }
}

/// Gathers the samples of one day window
pub struct SampleCollector;

impl SampleCollector {
    /// Flush `buffers` into `store`, then read `[start, end)` back
    pub fn collect(
        store: &mut dyn SampleStore,
        buffers: &mut SampleBuffers,
        start: i64,
        end: i64,
    ) -> Result<DaySamples, ComputeError> {
        if end <= start {
            return Err(ComputeError::InvalidWindow { start, end });
        }

        let flushed = buffers.flush_into(store)?;
        if flushed > 0 {
            log::debug!("Flushed {} buffered samples before collecting", flushed);
        }

        Ok(DaySamples {
            start_time: start,
            end_time: end,
            locations: store.locations_between(start, end)?,
            steps: store.steps_between(start, end)?,
            activities: store.activities_between(start, end)?,
            heart_rates: store.heart_rates_between(start, end)?,
            batteries: store.batteries_between(start, end)?,
        })
    }

    /// Push every sample of `samples` through `buffers`, flushing into
    /// `store` whenever a buffer comes due. Returns the number of samples taken.
    pub fn ingest(
        store: &mut dyn SampleStore,
        buffers: &mut SampleBuffers,
        samples: DaySamples,
    ) -> Result<usize, ComputeError> {
        let mut taken = 0;

        for sample in samples.locations {
            taken += 1;
            if buffers.push_location(sample) {
                buffers.flush_into(store)?;
            }
        }
        for sample in samples.steps {
            taken += 1;
            if buffers.push_steps(sample) {
                buffers.flush_into(store)?;
            }
        }
        for sample in samples.activities {
            taken += 1;
            if buffers.push_activity(sample) {
                buffers.flush_into(store)?;
            }
        }
        for sample in samples.heart_rates {
            taken += 1;
            if buffers.push_heart_rate(sample) {
                buffers.flush_into(store)?;
            }
        }
        for sample in samples.batteries {
            taken += 1;
            if buffers.push_battery(sample) {
                buffers.flush_into(store)?;
            }
        }

        Ok(taken)
    }
}

/// Check that a sample sequence never goes backwards in time
pub fn ensure_sorted<T: Timestamped>(kind: &'static str, samples: &[T]) -> Result<(), ComputeError> {
    match samples
        .windows(2)
        .position(|pair| pair[1].timestamp() < pair[0].timestamp())
    {
        Some(pos) => Err(ComputeError::UnsortedSamples {
            kind,
            index: pos + 1,
        }),
        None => Ok(()),
    }
}

impl DaySamples {
    /// Parse day samples from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        serde_json::from_str(json)
            .map_err(|e| ComputeError::ParseError(e.to_string()))
    }

    /// Reject an empty window or any sequence that is not time-ordered
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.end_time <= self.start_time {
            return Err(ComputeError::InvalidWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        ensure_sorted("location", &self.locations)?;
        ensure_sorted("step", &self.steps)?;
        ensure_sorted("activity", &self.activities)?;
        ensure_sorted("heart rate", &self.heart_rates)?;
        ensure_sorted("battery", &self.batteries)?;
        Ok(())
    }
}
