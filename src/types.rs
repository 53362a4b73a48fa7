//! Core types for the mobility engine
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw sensor samples, chart time slices, trips, and the day result.
//! All timestamps are milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transportation mode, using the platform activity-recognition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    InVehicle,
    OnBicycle,
    OnFoot,
    Still,
    Unknown,
    Tilting,
    Walking,
    Running,
}

impl ActivityType {
    /// Integer code reported by the activity-recognition source
    pub fn code(&self) -> i32 {
        match self {
            ActivityType::InVehicle => 0,
            ActivityType::OnBicycle => 1,
            ActivityType::OnFoot => 2,
            ActivityType::Still => 3,
            ActivityType::Unknown => 4,
            ActivityType::Tilting => 5,
            ActivityType::Walking => 7,
            ActivityType::Running => 8,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ActivityType::InVehicle,
            1 => ActivityType::OnBicycle,
            2 => ActivityType::OnFoot,
            3 => ActivityType::Still,
            5 => ActivityType::Tilting,
            7 => ActivityType::Walking,
            8 => ActivityType::Running,
            _ => ActivityType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::InVehicle => "in_vehicle",
            ActivityType::OnBicycle => "on_bicycle",
            ActivityType::OnFoot => "on_foot",
            ActivityType::Still => "still",
            ActivityType::Unknown => "unknown",
            ActivityType::Tilting => "tilting",
            ActivityType::Walking => "walking",
            ActivityType::Running => "running",
        }
    }

    /// Walking, running or generic on-foot movement
    pub fn is_on_foot(&self) -> bool {
        matches!(
            self,
            ActivityType::Walking | ActivityType::Running | ActivityType::OnFoot
        )
    }

    /// Still or not yet determined
    pub fn is_stationary(&self) -> bool {
        matches!(self, ActivityType::Still | ActivityType::Unknown)
    }
}

/// Direction of an activity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    Enter,
    Exit,
}

/// A GPS-derived location fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above the WGS84 ellipsoid (meters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius (meters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Location {
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// Cumulative pedometer reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSample {
    pub timestamp: i64,
    pub steps: u64,
}

/// Activity transition reported by the activity-recognition source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTransition {
    pub timestamp: i64,
    pub activity: ActivityType,
    pub direction: TransitionDirection,
}

impl ActivityTransition {
    pub fn enter(timestamp: i64, activity: ActivityType) -> Self {
        Self {
            timestamp,
            activity,
            direction: TransitionDirection::Enter,
        }
    }

    pub fn exit(timestamp: i64, activity: ActivityType) -> Self {
        Self {
            timestamp,
            activity,
            direction: TransitionDirection::Exit,
        }
    }
}

/// Heart rate reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub timestamp: i64,
    pub bpm: f64,
}

/// Battery reading (not part of the chart, passed through to the result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    pub timestamp: i64,
    /// Charge level (0-100)
    pub level: f64,
    #[serde(default)]
    pub charging: bool,
}

/// One window's worth of raw samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaySamples {
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub steps: Vec<StepSample>,
    #[serde(default)]
    pub activities: Vec<ActivityTransition>,
    #[serde(default)]
    pub heart_rates: Vec<HeartRateSample>,
    #[serde(default)]
    pub batteries: Vec<BatterySample>,
}

/// One chart element: everything known at a single timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Distance from the previous located slice (meters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Speed from the previous located slice (m/s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Fixes absorbed into this slice's stay point
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting: Vec<Location>,
    /// Cumulative step count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    /// Steps per minute since the previous step reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<f64>,
    /// Steps taken since the previous step reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_increment: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_in: Option<ActivityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_out: Option<ActivityType>,
    /// Final trip mode, set once the trip list is finalised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_activity: Option<ActivityType>,
}

impl TimeSlice {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    /// Fill every unset field from an earlier slice at the same timestamp
    pub fn copy_valid_fields(&mut self, earlier: &TimeSlice) {
        if self.location.is_none() {
            self.location = earlier.location.clone();
        }
        if self.distance.is_none() {
            self.distance = earlier.distance;
        }
        if self.speed.is_none() {
            self.speed = earlier.speed;
        }
        if self.supporting.is_empty() {
            self.supporting = earlier.supporting.clone();
        }
        if self.steps.is_none() {
            self.steps = earlier.steps;
        }
        if self.cadence.is_none() {
            self.cadence = earlier.cadence;
        }
        if self.step_increment.is_none() {
            self.step_increment = earlier.step_increment;
        }
        if self.heart_rate.is_none() {
            self.heart_rate = earlier.heart_rate;
        }
        if self.activity_in.is_none() {
            self.activity_in = earlier.activity_in;
        }
        if self.activity_out.is_none() {
            self.activity_out = earlier.activity_out;
        }
        if self.assigned_activity.is_none() {
            self.assigned_activity = earlier.assigned_activity;
        }
    }

    /// Whether this slice carries an activity transition
    pub fn has_transition(&self) -> bool {
        self.activity_in.is_some() || self.activity_out.is_some()
    }

    /// Whether this slice carries no sensor data at all
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.steps.is_none()
            && self.heart_rate.is_none()
            && !self.has_transition()
    }
}

/// The merged, time-ordered sensor slices of one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub start_time: i64,
    pub end_time: i64,
    pub slices: Vec<TimeSlice>,
    /// First location of the day, reference for radius of gyration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Location>,
}

impl Chart {
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Timestamp at which the slice range ending at `end_index` stops.
    ///
    /// This is the next slice's timestamp, so consecutive trips tile the window;
    /// the last slice runs to the window end.
    pub fn end_timestamp(&self, end_index: usize) -> i64 {
        match self.slices.get(end_index + 1) {
            Some(next) => next.timestamp,
            None => self.end_time,
        }
    }
}

/// A contiguous chart range assigned a single transportation mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// First chart index (inclusive)
    pub start_index: usize,
    /// Last chart index (inclusive)
    pub end_index: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub activity: ActivityType,
    pub steps: u64,
    /// GPS distance (meters)
    pub distance: f64,
    /// Radius of gyration against the day's base location (meters)
    pub radius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<f64>,
    /// The mode has been confirmed by a correction pass
    pub reliable: bool,
    /// The mode was changed by a heuristic and is open to re-examination
    pub suspicious: bool,
    pub locations: Vec<Location>,
}

impl Trip {
    /// Trip duration in milliseconds
    pub fn duration(&self) -> i64 {
        (self.end_time - self.start_time).max(0)
    }

    /// Steps per minute over the whole trip
    pub fn cadence(&self) -> Option<f64> {
        compute_cadence(self.steps, self.duration())
    }

    /// Average speed in m/s
    pub fn speed(&self) -> Option<f64> {
        let duration_sec = self.duration() as f64 / 1000.0;
        if duration_sec <= 0.0 {
            return None;
        }
        Some(self.distance / duration_sec)
    }

    /// Change the mode and flag the trip for a later audit
    pub fn reclassify(&mut self, activity: ActivityType) {
        if self.activity != activity {
            self.activity = activity;
            self.suspicious = true;
        }
    }
}

/// Steps per minute for `steps` taken over `duration_ms`
pub fn compute_cadence(steps: u64, duration_ms: i64) -> Option<f64> {
    if duration_ms <= 0 {
        return None;
    }
    Some(steps as f64 / (duration_ms as f64 / 60_000.0))
}

/// Per-mode totals for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub vehicle_msecs: i64,
    pub walking_msecs: i64,
    pub running_msecs: i64,
    pub cycling_msecs: i64,
    pub still_msecs: i64,
    /// Unknown and tilting time
    pub other_msecs: i64,
    pub vehicle_km: f64,
    pub walking_km: f64,
    pub running_km: f64,
    pub cycling_km: f64,
    pub still_km: f64,
    pub total_steps: u64,
    /// Largest trip radius of gyration (meters)
    pub max_radius: f64,
    pub trip_count: usize,
}

impl DailySummary {
    /// Sum of all per-mode durations
    pub fn total_msecs(&self) -> i64 {
        self.vehicle_msecs
            + self.walking_msecs
            + self.running_msecs
            + self.cycling_msecs
            + self.still_msecs
            + self.other_msecs
    }
}

/// Result of one day computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayResult {
    pub computation_id: String,
    pub computed_at: DateTime<Utc>,
    pub start_time: i64,
    pub end_time: i64,
    pub activities: Vec<ActivityTransition>,
    pub batteries: Vec<BatterySample>,
    pub heart_rates: Vec<HeartRateSample>,
    pub locations: Vec<Location>,
    pub steps: Vec<StepSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trips: Option<Vec<Trip>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<DailySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<Chart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_codes_round_trip() {
        for activity in [
            ActivityType::InVehicle,
            ActivityType::OnBicycle,
            ActivityType::OnFoot,
            ActivityType::Still,
            ActivityType::Unknown,
            ActivityType::Tilting,
            ActivityType::Walking,
            ActivityType::Running,
        ] {
            assert_eq!(ActivityType::from_code(activity.code()), activity);
        }
        assert_eq!(ActivityType::from_code(6), ActivityType::Unknown);
        assert_eq!(ActivityType::from_code(-1), ActivityType::Unknown);
    }

    #[test]
    fn test_activity_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityType::InVehicle).unwrap();
        assert_eq!(json, "\"in_vehicle\"");
        assert_eq!(ActivityType::OnBicycle.as_str(), "on_bicycle");
    }

    #[test]
    fn test_copy_valid_fields_keeps_later_values() {
        let mut earlier = TimeSlice::new(1000);
        earlier.steps = Some(10);
        earlier.heart_rate = Some(70.0);
        earlier.activity_in = Some(ActivityType::Walking);

        let mut later = TimeSlice::new(1000);
        later.heart_rate = Some(80.0);
        later.copy_valid_fields(&earlier);

        assert_eq!(later.steps, Some(10));
        assert_eq!(later.heart_rate, Some(80.0));
        assert_eq!(later.activity_in, Some(ActivityType::Walking));
    }

    #[test]
    fn test_cadence_never_negative() {
        assert_eq!(compute_cadence(0, 60_000), Some(0.0));
        assert_eq!(compute_cadence(120, 60_000), Some(120.0));
        assert_eq!(compute_cadence(100, 0), None);
        assert_eq!(compute_cadence(100, -5), None);
    }

    #[test]
    fn test_reclassify_marks_suspicious_only_on_change() {
        let mut trip = Trip {
            start_index: 0,
            end_index: 3,
            start_time: 0,
            end_time: 60_000,
            activity: ActivityType::Walking,
            steps: 0,
            distance: 0.0,
            radius: 0.0,
            avg_heart_rate: None,
            reliable: false,
            suspicious: false,
            locations: Vec::new(),
        };
        trip.reclassify(ActivityType::Walking);
        assert!(!trip.suspicious);
        trip.reclassify(ActivityType::Still);
        assert!(trip.suspicious);
        assert_eq!(trip.activity, ActivityType::Still);
    }

    #[test]
    fn test_day_samples_defaults_missing_sequences() {
        let samples: DaySamples =
            serde_json::from_str(r#"{"start_time": 0, "end_time": 86400000}"#).unwrap();
        assert!(samples.locations.is_empty());
        assert!(samples.batteries.is_empty());
    }
}
