//! Engine configuration
//!
//! Every threshold the pipeline uses lives here as a named, overridable value.
//! The reclassification thresholds in [`Thresholds`] are empirically tuned and
//! have no documented derivation; change them only with field data to back it.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Trips shorter than this are "short" (3 minutes)
pub const DEFAULT_SHORT_ACTIVITY_MS: i64 = 3 * 60_000;

/// Implied speed above which a fix is a GPS spike (~200 km/h)
pub const DEFAULT_SPIKE_SPEED_MPS: f64 = 55.0;

/// Fixes with a worse reported accuracy are discarded
pub const DEFAULT_MAX_ACCURACY_M: f64 = 200.0;

/// Synchronous Euclidean distance tolerance for simplification
pub const DEFAULT_SED_TOLERANCE_M: f64 = 20.0;

pub const DEFAULT_STAY_POINT_RADIUS_M: f64 = 50.0;

/// Minimum dwell for a stay point (5 minutes)
pub const DEFAULT_STAY_POINT_DWELL_MS: i64 = 5 * 60_000;

/// Tunable thresholds for the correction and reclassification heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Cadence (steps/min) above which movement counts as walking
    pub walking_cadence_spm: f64,
    /// Cadence (steps/min) above which movement counts as running
    pub running_cadence_spm: f64,
    /// Steps inside a long still that reveal a lost walking activity
    pub recovery_min_steps: u64,
    /// Steps that make a demoted trip on-foot rather than still
    pub demotion_min_steps: u64,
    /// Speed (m/s) above which a slice is moving like a vehicle
    pub vehicle_speed_mps: f64,
    /// Stops shorter than this do not end a hidden vehicle stretch
    pub vehicle_stop_tolerance_ms: i64,
    /// Minimum distance of a vehicle trip recovered from a long still
    pub hidden_vehicle_min_distance_m: f64,
    /// Speed (m/s) above which a short walk between vehicles is really a vehicle
    pub walk_in_vehicle_speed_mps: f64,
    /// Vehicle or bicycle trips below this GPS distance are implausible
    pub min_trip_distance_m: f64,
    /// A mode's day total must reach this multiple of a trip's duration
    pub day_share_factor: i64,
    /// Trips that never get further than this from the base location
    pub min_travel_radius_m: f64,
    /// Average speed (m/s) confirming a vehicle trip
    pub vehicle_confirm_speed_mps: f64,
    /// Distance (m) confirming a vehicle trip
    pub vehicle_confirm_distance_m: f64,
    /// Average speed range (m/s) confirming a bicycle trip
    pub bicycle_min_speed_mps: f64,
    pub bicycle_max_speed_mps: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            walking_cadence_spm: 20.0,
            running_cadence_spm: 140.0,
            recovery_min_steps: 1000,
            demotion_min_steps: 100,
            vehicle_speed_mps: 5.5,
            vehicle_stop_tolerance_ms: 3 * 60_000,
            hidden_vehicle_min_distance_m: 1000.0,
            walk_in_vehicle_speed_mps: 11.0,
            min_trip_distance_m: 100.0,
            day_share_factor: 2,
            min_travel_radius_m: 100.0,
            vehicle_confirm_speed_mps: 8.0,
            vehicle_confirm_distance_m: 1000.0,
            bicycle_min_speed_mps: 2.0,
            bicycle_max_speed_mps: 12.0,
        }
    }
}

/// Configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Collapse stationary clusters into stay points
    pub use_stay_points: bool,
    /// Simplify the location polyline
    pub compact_locations: bool,
    pub short_activity_ms: i64,
    pub spike_speed_mps: f64,
    pub max_accuracy_m: f64,
    pub sed_tolerance_m: f64,
    pub stay_point_radius_m: f64,
    pub stay_point_dwell_ms: i64,
    pub thresholds: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_stay_points: true,
            compact_locations: true,
            short_activity_ms: DEFAULT_SHORT_ACTIVITY_MS,
            spike_speed_mps: DEFAULT_SPIKE_SPEED_MPS,
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            sed_tolerance_m: DEFAULT_SED_TOLERANCE_M,
            stay_point_radius_m: DEFAULT_STAY_POINT_RADIUS_M,
            stay_point_dwell_ms: DEFAULT_STAY_POINT_DWELL_MS,
            thresholds: Thresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Reject thresholds that would disable or invert a pass
    pub fn validate(&self) -> Result<(), ComputeError> {
        let positive = [
            ("short_activity_ms", self.short_activity_ms as f64),
            ("spike_speed_mps", self.spike_speed_mps),
            ("max_accuracy_m", self.max_accuracy_m),
            ("sed_tolerance_m", self.sed_tolerance_m),
            ("stay_point_radius_m", self.stay_point_radius_m),
            ("stay_point_dwell_ms", self.stay_point_dwell_ms as f64),
            ("walking_cadence_spm", self.thresholds.walking_cadence_spm),
            ("vehicle_speed_mps", self.thresholds.vehicle_speed_mps),
            ("day_share_factor", self.thresholds.day_share_factor as f64),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ComputeError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let t = &self.thresholds;
        if t.running_cadence_spm <= t.walking_cadence_spm {
            return Err(ComputeError::InvalidConfig(
                "running_cadence_spm must exceed walking_cadence_spm".to_string(),
            ));
        }
        if t.bicycle_max_speed_mps <= t.bicycle_min_speed_mps {
            return Err(ComputeError::InvalidConfig(
                "bicycle_max_speed_mps must exceed bicycle_min_speed_mps".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            EngineConfig::from_json(r#"{"use_stay_points": false, "thresholds": {"recovery_min_steps": 500}}"#)
                .unwrap();
        assert!(!config.use_stay_points);
        assert!(config.compact_locations);
        assert_eq!(config.thresholds.recovery_min_steps, 500);
        assert_eq!(config.thresholds.walk_in_vehicle_speed_mps, 11.0);
        assert_eq!(config.short_activity_ms, DEFAULT_SHORT_ACTIVITY_MS);
    }

    #[test]
    fn test_rejects_non_positive_thresholds() {
        let result = EngineConfig::from_json(r#"{"spike_speed_mps": 0.0}"#);
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.thresholds.running_cadence_spm = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
