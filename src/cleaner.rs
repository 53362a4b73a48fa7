//! Location cleaning
//!
//! Three composable passes over the day's ordered location fixes:
//! spike removal, stay-point detection and SED simplification. The cleaned
//! fixes are written back into the chart and the per-slice distance and speed
//! are recomputed from consecutive surviving fixes.

use crate::config::EngineConfig;
use crate::geometry::{centroid, distance, speed, synchronous_distance};
use crate::types::{Chart, Location, TimeSlice};
use std::collections::HashMap;

/// After this many consecutive rejections that agree with each other, the
/// next agreeing fix becomes the new anchor
const MAX_CONSECUTIVE_SPIKES: usize = 3;

/// A fix that survived cleaning, with the fixes it absorbed as a stay point
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedFix {
    pub location: Location,
    pub supporting: Vec<Location>,
}

impl CleanedFix {
    fn plain(location: Location) -> Self {
        Self {
            location,
            supporting: Vec::new(),
        }
    }

    pub fn is_stay_point(&self) -> bool {
        !self.supporting.is_empty()
    }
}

/// Location cleaner driven by the engine configuration
pub struct LocationCleaner<'a> {
    config: &'a EngineConfig,
}

impl<'a> LocationCleaner<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Clean the chart's fixes in place and recompute distance and speed
    pub fn clean(&self, chart: &mut Chart) {
        let raw: Vec<Location> = chart
            .slices
            .iter()
            .filter_map(|s| s.location.clone())
            .collect();
        let raw_count = raw.len();

        let accepted = remove_spikes(&raw, self.config.spike_speed_mps, self.config.max_accuracy_m);

        let mut fixes = if self.config.use_stay_points {
            detect_stay_points(
                &accepted,
                self.config.stay_point_radius_m,
                self.config.stay_point_dwell_ms,
            )
        } else {
            accepted.into_iter().map(CleanedFix::plain).collect()
        };

        if self.config.compact_locations {
            fixes = simplify_fixes(fixes, self.config.sed_tolerance_m);
        }

        log::debug!(
            "Location cleaning kept {} of {} fixes ({} stay points)",
            fixes.len(),
            raw_count,
            fixes.iter().filter(|f| f.is_stay_point()).count()
        );

        write_back(chart, fixes);
        recompute_motion(&mut chart.slices);
        chart.base = chart.slices.iter().find_map(|s| s.location.clone());
    }
}

/// Drop fixes that imply an impossible jump from the previous accepted fix.
///
/// Fixes whose reported accuracy is worse than `max_accuracy_m` are dropped too.
pub fn remove_spikes(locations: &[Location], max_speed_mps: f64, max_accuracy_m: f64) -> Vec<Location> {
    let mut accepted: Vec<Location> = Vec::with_capacity(locations.len());
    let mut last_rejected: Option<&Location> = None;
    let mut rejected_run = 0;
    let mut spikes = 0;

    for location in locations {
        if location.accuracy.is_some_and(|a| a > max_accuracy_m) {
            continue;
        }

        let is_spike = match accepted.last() {
            None => false,
            Some(previous) => match speed(previous, location) {
                Some(implied) => implied > max_speed_mps,
                None => true,
            },
        };

        if is_spike {
            let agrees = last_rejected
                .and_then(|rejected| speed(rejected, location))
                .is_some_and(|implied| implied <= max_speed_mps);
            if !agrees || rejected_run < MAX_CONSECUTIVE_SPIKES {
                rejected_run = if agrees { rejected_run + 1 } else { 1 };
                last_rejected = Some(location);
                spikes += 1;
                continue;
            }
        }

        rejected_run = 0;
        last_rejected = None;
        accepted.push(location.clone());
    }

    if spikes > 0 {
        log::debug!("Removed {} GPS spikes", spikes);
    }

    accepted
}

/// Collapse stationary clusters into stay points.
///
/// From each anchor fix the run is extended while fixes stay within
/// `radius_m` of the anchor. A run whose dwell exceeds `dwell_ms` becomes one
/// fix at the anchor's timestamp, placed at the run's centroid, carrying the
/// absorbed fixes as support.
pub fn detect_stay_points(locations: &[Location], radius_m: f64, dwell_ms: i64) -> Vec<CleanedFix> {
    let mut fixes = Vec::with_capacity(locations.len());
    let mut i = 0;

    while i < locations.len() {
        let anchor = &locations[i];
        let mut j = i + 1;
        while j < locations.len() && distance(anchor, &locations[j]) <= radius_m {
            j += 1;
        }

        let dwell = locations[j - 1].timestamp - anchor.timestamp;
        if j - 1 > i && dwell > dwell_ms {
            let members = locations[i..j].to_vec();
            let location = centroid(&members).unwrap_or_else(|| anchor.clone());
            fixes.push(CleanedFix {
                location,
                supporting: members,
            });
            i = j;
        } else {
            fixes.push(CleanedFix::plain(anchor.clone()));
            i += 1;
        }
    }

    fixes
}

/// Indices kept by synchronous-Euclidean-distance simplification.
///
/// Time-aware Douglas-Peucker: between two kept anchors, the intermediate fix
/// deviating most from its time-interpolated chord position is kept when the
/// deviation exceeds `tolerance_m`, and both halves are examined in turn.
/// The first and last fixes are always kept.
pub fn simplify_sed_indices(points: &[Location], tolerance_m: f64) -> Vec<usize> {
    let n = points.len();
    if n <= 2 {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut pending = vec![(0, n - 1)];
    while let Some((first, last)) = pending.pop() {
        if last <= first + 1 {
            continue;
        }

        let mut max_deviation = 0.0;
        let mut max_index = first;
        for k in first + 1..last {
            let deviation = synchronous_distance(&points[first], &points[last], &points[k]);
            if deviation > max_deviation {
                max_deviation = deviation;
                max_index = k;
            }
        }

        if max_deviation > tolerance_m {
            keep[max_index] = true;
            pending.push((first, max_index));
            pending.push((max_index, last));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &kept)| kept.then_some(i))
        .collect()
}

/// SED simplification of a plain fix sequence
pub fn simplify_sed(points: &[Location], tolerance_m: f64) -> Vec<Location> {
    simplify_sed_indices(points, tolerance_m)
        .into_iter()
        .map(|i| points[i].clone())
        .collect()
}

/// Simplify cleaned fixes, never dropping a stay point.
///
/// Stay points split the sequence; each stretch between them is simplified
/// on its own with the stay points as its endpoints.
fn simplify_fixes(fixes: Vec<CleanedFix>, tolerance_m: f64) -> Vec<CleanedFix> {
    if fixes.len() <= 2 {
        return fixes;
    }

    let mut anchors: Vec<usize> = vec![0];
    anchors.extend(
        fixes
            .iter()
            .enumerate()
            .filter(|(i, f)| *i > 0 && *i < fixes.len() - 1 && f.is_stay_point())
            .map(|(i, _)| i),
    );
    anchors.push(fixes.len() - 1);

    let points: Vec<Location> = fixes.iter().map(|f| f.location.clone()).collect();
    let mut keep = vec![false; fixes.len()];
    for pair in anchors.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        for offset in simplify_sed_indices(&points[from..=to], tolerance_m) {
            keep[from + offset] = true;
        }
    }

    fixes
        .into_iter()
        .zip(keep)
        .filter_map(|(fix, kept)| kept.then_some(fix))
        .collect()
}

/// Replace the chart's fixes with the cleaned ones.
///
/// Slices that lose their fix and carry nothing else are removed, except the
/// window anchors at either end.
fn write_back(chart: &mut Chart, fixes: Vec<CleanedFix>) {
    let mut by_timestamp: HashMap<i64, CleanedFix> = fixes
        .into_iter()
        .map(|f| (f.location.timestamp, f))
        .collect();

    for slice in chart.slices.iter_mut() {
        if slice.location.is_none() {
            continue;
        }
        match by_timestamp.remove(&slice.timestamp) {
            Some(fix) => {
                slice.location = Some(fix.location);
                slice.supporting = fix.supporting;
            }
            None => {
                slice.location = None;
                slice.supporting.clear();
            }
        }
    }

    let last = chart.slices.len().saturating_sub(1);
    let mut index = 0;
    chart.slices.retain(|slice| {
        let keep = index == 0 || index == last || !slice.is_empty();
        index += 1;
        keep
    });
}

/// Recompute distance and speed of every located slice from the previous one
pub fn recompute_motion(slices: &mut [TimeSlice]) {
    let mut previous: Option<Location> = None;

    for slice in slices.iter_mut() {
        slice.distance = None;
        slice.speed = None;

        let Some(location) = slice.location.as_ref() else {
            continue;
        };

        if let Some(prev) = previous.as_ref() {
            slice.distance = Some(distance(prev, location));
            slice.speed = speed(prev, location);
        }
        previous = Some(location.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartBuilder;
    use crate::testutil::eastbound;
    use crate::types::DaySamples;

    /// Fixes every 10 s moving east at roughly 11 m/s along the equator
    fn straight_track(n: usize) -> Vec<Location> {
        eastbound(0, n, 10_000, 0.001)
    }

    #[test]
    fn test_remove_spikes_drops_jump() {
        let mut track = straight_track(5);
        track[2].latitude = 1.0;
        let cleaned = remove_spikes(&track, 55.0, 200.0);
        assert_eq!(cleaned.len(), 4);
        assert!(cleaned.iter().all(|l| l.latitude == 0.0));
    }

    #[test]
    fn test_remove_spikes_drops_inaccurate_fixes() {
        let mut track = straight_track(3);
        track[1].accuracy = Some(500.0);
        track[2].accuracy = Some(15.0);
        let cleaned = remove_spikes(&track, 55.0, 200.0);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1].timestamp, 20_000);
    }

    #[test]
    fn test_remove_spikes_recovers_after_relocation() {
        let mut track = vec![Location::new(0, 0.0, 0.0)];
        // The device reappears far away and stays there
        for i in 1..=6 {
            track.push(Location::new(i * 10_000, 2.0, 2.0));
        }
        let cleaned = remove_spikes(&track, 55.0, 200.0);
        assert_eq!(cleaned.len(), 4);
        assert_eq!(cleaned[1].timestamp, 40_000);
    }

    #[test]
    fn test_scattered_spike_burst_does_not_become_anchor() {
        let mut track = straight_track(9);
        for (i, lat) in [(2, 1.0), (3, -1.0), (4, 1.0), (5, -1.0)] {
            track[i].latitude = lat;
        }
        let cleaned = remove_spikes(&track, 55.0, 200.0);
        let kept: Vec<i64> = cleaned.iter().map(|l| l.timestamp / 10_000).collect();
        assert_eq!(kept, vec![0, 1, 6, 7, 8]);
    }

    #[test]
    fn test_stay_point_collapses_long_dwell() {
        let mut fixes: Vec<Location> = (0..10)
            .map(|i| Location::new(i * 60_000, 45.0, 9.0 + (i % 2) as f64 * 0.0001))
            .collect();
        fixes.push(Location::new(11 * 60_000, 45.1, 9.0));

        let cleaned = detect_stay_points(&fixes, 50.0, 5 * 60_000);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned[0].is_stay_point());
        assert_eq!(cleaned[0].supporting.len(), 10);
        assert_eq!(cleaned[0].location.timestamp, 0);
        assert!(!cleaned[1].is_stay_point());
    }

    #[test]
    fn test_short_dwell_is_not_a_stay_point() {
        let fixes: Vec<Location> = (0..3).map(|i| Location::new(i * 60_000, 45.0, 9.0)).collect();
        let cleaned = detect_stay_points(&fixes, 50.0, 5 * 60_000);
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned.iter().all(|f| !f.is_stay_point()));
    }

    #[test]
    fn test_sed_keeps_endpoints_and_drops_collinear_points() {
        let track = straight_track(20);
        let simplified = simplify_sed(&track, 20.0);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified[0], track[0]);
        assert_eq!(simplified[1], track[19]);
    }

    #[test]
    fn test_sed_keeps_corner() {
        let mut track = straight_track(10);
        for (i, fix) in track.iter_mut().enumerate().skip(5) {
            fix.longitude = 0.005;
            fix.latitude = (i - 5) as f64 * 0.001;
        }
        let kept = simplify_sed_indices(&track, 20.0);
        assert!(kept.contains(&0));
        assert!(kept.contains(&9));
        assert!(kept.contains(&5));
        assert!(kept.len() <= track.len());
    }

    #[test]
    fn test_sed_preserves_small_inputs() {
        assert!(simplify_sed(&[], 20.0).is_empty());
        let one = straight_track(1);
        assert_eq!(simplify_sed(&one, 20.0), one);
    }

    #[test]
    fn test_simplification_never_drops_stay_points() {
        let mut fixes: Vec<CleanedFix> = straight_track(9).into_iter().map(CleanedFix::plain).collect();
        fixes[4].supporting = vec![fixes[4].location.clone()];
        let simplified = simplify_fixes(fixes, 20.0);
        assert_eq!(simplified.len(), 3);
        assert!(simplified[1].is_stay_point());
    }

    #[test]
    fn test_clean_recomputes_speed_and_distance() {
        let samples = DaySamples {
            start_time: 0,
            end_time: 1_000_000,
            locations: straight_track(5),
            ..Default::default()
        };
        let mut chart = ChartBuilder::build(&samples);
        let config = EngineConfig {
            use_stay_points: false,
            compact_locations: false,
            ..Default::default()
        };
        LocationCleaner::new(&config).clean(&mut chart);

        let located: Vec<&TimeSlice> = chart.slices.iter().filter(|s| s.location.is_some()).collect();
        assert_eq!(located.len(), 5);
        assert!(located[0].distance.is_none());
        let d = located[1].distance.unwrap();
        assert!((d - 111.2).abs() < 0.5);
        assert!((located[1].speed.unwrap() - 11.12).abs() < 0.05);
    }

    #[test]
    fn test_clean_removes_emptied_slices_but_keeps_anchors() {
        let samples = DaySamples {
            start_time: 0,
            end_time: 1_000_000,
            locations: straight_track(10),
            ..Default::default()
        };
        let mut chart = ChartBuilder::build(&samples);
        let config = EngineConfig {
            use_stay_points: false,
            compact_locations: true,
            ..Default::default()
        };
        LocationCleaner::new(&config).clean(&mut chart);

        // First fix shares the start anchor; the last fix and the end anchor remain
        assert_eq!(chart.len(), 3);
        assert_eq!(chart.slices[0].timestamp, 0);
        assert_eq!(chart.slices[2].timestamp, 999_999);
    }
}
