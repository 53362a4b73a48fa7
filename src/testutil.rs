//! Builders shared by the unit tests

use crate::types::{ActivityType, Chart, Location, TimeSlice, Trip};

pub fn slice(timestamp: i64) -> TimeSlice {
    TimeSlice::new(timestamp)
}

pub fn chart_with(slices: Vec<TimeSlice>, start_time: i64, end_time: i64) -> Chart {
    let base = slices.iter().find_map(|s| s.location.clone());
    Chart {
        start_time,
        end_time,
        slices,
        base,
    }
}

/// A trip over `[start_index, end_index]` lasting `minutes`, starting at `start_minute`
pub fn trip(
    start_index: usize,
    end_index: usize,
    start_minute: i64,
    minutes: i64,
    activity: ActivityType,
) -> Trip {
    Trip {
        start_index,
        end_index,
        start_time: start_minute * 60_000,
        end_time: (start_minute + minutes) * 60_000,
        activity,
        steps: 0,
        distance: 0.0,
        radius: 0.0,
        avg_heart_rate: None,
        reliable: false,
        suspicious: false,
        locations: Vec::new(),
    }
}

/// Consecutive one-slice trips with the given modes and durations in minutes
pub fn trip_sequence(legs: &[(ActivityType, i64)]) -> Vec<Trip> {
    let mut minute = 0;
    legs.iter()
        .enumerate()
        .map(|(i, &(activity, minutes))| {
            let t = trip(i, i, minute, minutes, activity);
            minute += minutes;
            t
        })
        .collect()
}

/// Fixes moving east along the equator at a constant speed, one every `step_ms`
pub fn eastbound(start_ts: i64, count: usize, step_ms: i64, degrees_per_step: f64) -> Vec<Location> {
    (0..count)
        .map(|i| {
            Location::new(
                start_ts + i as i64 * step_ms,
                0.0,
                i as f64 * degrees_per_step,
            )
        })
        .collect()
}
