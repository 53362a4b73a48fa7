//! Chart construction
//!
//! Merges the per-sensor sample sequences of one day into a single ordered
//! sequence of time slices, one per distinct timestamp.

use crate::types::{
    ActivityTransition, Chart, DaySamples, TimeSlice, TransitionDirection,
};
use std::collections::BTreeMap;

/// An ENTER followed this closely by the EXIT of another activity is reordered
pub const FLOW_SWAP_WINDOW_MS: i64 = 2_000;

/// Builder for the day chart
pub struct ChartBuilder;

impl ChartBuilder {
    /// Build the chart for `samples`, ignoring samples outside the window.
    ///
    /// The chart always holds a slice at the window start and one at
    /// `end_time - 1`, so trips cover the whole window.
    pub fn build(samples: &DaySamples) -> Chart {
        let start = samples.start_time;
        let end = samples.end_time;
        let in_window = |ts: i64| ts >= start && ts < end;

        // Anchors go first so any reading at the same timestamp wins the merge
        let mut raw = vec![TimeSlice::new(start), TimeSlice::new(end - 1)];

        for location in samples.locations.iter().filter(|l| in_window(l.timestamp)) {
            let mut slice = TimeSlice::new(location.timestamp);
            slice.location = Some(location.clone());
            raw.push(slice);
        }

        for reading in samples.steps.iter().filter(|s| in_window(s.timestamp)) {
            let mut slice = TimeSlice::new(reading.timestamp);
            slice.steps = Some(reading.steps);
            raw.push(slice);
        }

        for reading in samples.heart_rates.iter().filter(|h| in_window(h.timestamp)) {
            let mut slice = TimeSlice::new(reading.timestamp);
            slice.heart_rate = Some(reading.bpm);
            raw.push(slice);
        }

        let transitions: Vec<ActivityTransition> = samples
            .activities
            .iter()
            .filter(|a| in_window(a.timestamp))
            .cloned()
            .collect();
        for transition in normalise_activity_flow(&transitions) {
            let mut slice = TimeSlice::new(transition.timestamp);
            match transition.direction {
                TransitionDirection::Enter => slice.activity_in = Some(transition.activity),
                TransitionDirection::Exit => slice.activity_out = Some(transition.activity),
            }
            raw.push(slice);
        }

        let mut slices = Self::merge_slices(raw);
        compute_step_cadence(&mut slices);

        let base = slices.iter().find_map(|s| s.location.clone());

        log::debug!(
            "Built chart with {} slices from {} locations, {} steps, {} transitions",
            slices.len(),
            samples.locations.len(),
            samples.steps.len(),
            transitions.len()
        );

        Chart {
            start_time: start,
            end_time: end,
            slices,
            base,
        }
    }

    /// Merge a raw slice list, folding duplicates by timestamp.
    ///
    /// For duplicates the later slice wins and its unset fields are copied from
    /// the earlier one.
    pub fn merge_slices(raw: Vec<TimeSlice>) -> Vec<TimeSlice> {
        let mut merged: BTreeMap<i64, TimeSlice> = BTreeMap::new();
        for mut slice in raw {
            if let Some(earlier) = merged.get(&slice.timestamp) {
                slice.copy_valid_fields(earlier);
            }
            merged.insert(slice.timestamp, slice);
        }
        merged.into_values().collect()
    }
}

/// Reorder ENTER/EXIT pairs reported in the wrong sequence.
///
/// When an ENTER is followed within [`FLOW_SWAP_WINDOW_MS`] by the next EXIT
/// and that EXIT belongs to a different activity, the two swap timestamps so
/// the EXIT comes first.
pub fn normalise_activity_flow(transitions: &[ActivityTransition]) -> Vec<ActivityTransition> {
    let mut flow = transitions.to_vec();
    let mut swapped = 0;

    for i in 0..flow.len() {
        if flow[i].direction != TransitionDirection::Enter {
            continue;
        }
        let next_exit = (i + 1..flow.len()).find(|&j| flow[j].direction == TransitionDirection::Exit);
        if let Some(j) = next_exit {
            let gap = flow[j].timestamp - flow[i].timestamp;
            if flow[j].activity != flow[i].activity && gap <= FLOW_SWAP_WINDOW_MS {
                let enter_ts = flow[i].timestamp;
                flow[i].timestamp = flow[j].timestamp;
                flow[j].timestamp = enter_ts;
                flow.swap(i, j);
                swapped += 1;
            }
        }
    }

    if swapped > 0 {
        log::warn!("Reordered {} out-of-sequence activity transitions", swapped);
    }

    flow
}

/// Fill step increments and cadence from the cumulative step counts.
///
/// A count lower than the previous one is a counter reset and adds no steps.
pub fn compute_step_cadence(slices: &mut [TimeSlice]) {
    let mut previous: Option<(i64, u64)> = None;

    for slice in slices.iter_mut() {
        let Some(steps) = slice.steps else {
            continue;
        };

        if let Some((prev_ts, prev_steps)) = previous {
            let increment = steps.saturating_sub(prev_steps);
            slice.step_increment = Some(increment);
            slice.cadence = crate::types::compute_cadence(increment, slice.timestamp - prev_ts);
        }

        previous = Some((slice.timestamp, steps));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityType, HeartRateSample, Location, StepSample};
    use pretty_assertions::assert_eq;

    fn day() -> DaySamples {
        DaySamples {
            start_time: 0,
            end_time: 1_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_day_has_two_anchor_slices() {
        let chart = ChartBuilder::build(&day());
        assert_eq!(chart.len(), 2);
        assert_eq!(chart.slices[0].timestamp, 0);
        assert_eq!(chart.slices[1].timestamp, 999_999);
        assert!(chart.base.is_none());
    }

    #[test]
    fn test_samples_at_same_timestamp_share_a_slice() {
        let mut samples = day();
        samples.locations = vec![Location::new(1000, 1.0, 2.0)];
        samples.steps = vec![StepSample { timestamp: 1000, steps: 42 }];
        samples.heart_rates = vec![HeartRateSample { timestamp: 1000, bpm: 70.0 }];
        samples.activities = vec![ActivityTransition::enter(1000, ActivityType::Walking)];

        let chart = ChartBuilder::build(&samples);
        assert_eq!(chart.len(), 3);
        let slice = &chart.slices[1];
        assert_eq!(slice.timestamp, 1000);
        assert_eq!(slice.steps, Some(42));
        assert_eq!(slice.heart_rate, Some(70.0));
        assert_eq!(slice.activity_in, Some(ActivityType::Walking));
        assert_eq!(chart.base.as_ref().map(|b| b.latitude), Some(1.0));
    }

    #[test]
    fn test_build_merges_exit_enter_and_repeated_fixes() {
        let mut samples = day();
        samples.locations = vec![Location::new(2000, 1.0, 1.0), Location::new(2000, 3.0, 3.0)];
        samples.activities = vec![
            ActivityTransition::exit(2000, ActivityType::Walking),
            ActivityTransition::enter(2000, ActivityType::Still),
        ];

        let chart = ChartBuilder::build(&samples);
        assert_eq!(chart.len(), 3);
        let slice = &chart.slices[1];
        assert_eq!(slice.activity_out, Some(ActivityType::Walking));
        assert_eq!(slice.activity_in, Some(ActivityType::Still));
        assert_eq!(slice.location.as_ref().map(|l| l.latitude), Some(3.0));
    }

    #[test]
    fn test_samples_outside_window_are_ignored() {
        let mut samples = day();
        samples.locations = vec![
            Location::new(-5, 0.0, 0.0),
            Location::new(500, 0.0, 0.0),
            Location::new(1_000_000, 0.0, 0.0),
        ];
        let chart = ChartBuilder::build(&samples);
        assert_eq!(chart.len(), 3);
        assert!(chart.slices.iter().all(|s| s.timestamp >= 0 && s.timestamp < 1_000_000));
    }

    #[test]
    fn test_chart_is_strictly_ordered() {
        let mut samples = day();
        samples.locations = vec![Location::new(300, 0.0, 0.0), Location::new(900, 0.0, 0.0)];
        samples.steps = vec![StepSample { timestamp: 600, steps: 1 }];
        let chart = ChartBuilder::build(&samples);
        assert!(chart
            .slices
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[test]
    fn test_enter_before_exit_of_other_activity_is_swapped() {
        let transitions = vec![
            ActivityTransition::enter(10_000, ActivityType::InVehicle),
            ActivityTransition::exit(11_500, ActivityType::Still),
        ];
        let flow = normalise_activity_flow(&transitions);
        assert_eq!(
            flow,
            vec![
                ActivityTransition::exit(10_000, ActivityType::Still),
                ActivityTransition::enter(11_500, ActivityType::InVehicle),
            ]
        );
    }

    #[test]
    fn test_distant_or_same_activity_pairs_are_kept() {
        let far = vec![
            ActivityTransition::enter(10_000, ActivityType::InVehicle),
            ActivityTransition::exit(13_000, ActivityType::Still),
        ];
        assert_eq!(normalise_activity_flow(&far), far);

        let same = vec![
            ActivityTransition::enter(10_000, ActivityType::Walking),
            ActivityTransition::exit(10_500, ActivityType::Walking),
        ];
        assert_eq!(normalise_activity_flow(&same), same);
    }

    #[test]
    fn test_cadence_from_cumulative_steps() {
        let mut samples = day();
        samples.steps = vec![
            StepSample { timestamp: 60_000, steps: 100 },
            StepSample { timestamp: 120_000, steps: 200 },
            StepSample { timestamp: 180_000, steps: 50 },
        ];
        let chart = ChartBuilder::build(&samples);
        let stepped: Vec<&TimeSlice> = chart.slices.iter().filter(|s| s.steps.is_some()).collect();
        assert_eq!(stepped[0].cadence, None);
        assert_eq!(stepped[1].step_increment, Some(100));
        assert_eq!(stepped[1].cadence, Some(100.0));
        // Counter reset
        assert_eq!(stepped[2].step_increment, Some(0));
        assert!(stepped.iter().filter_map(|s| s.cadence).all(|c| c >= 0.0));
    }

    #[test]
    fn test_merge_slices_copies_valid_fields() {
        let mut first = TimeSlice::new(5);
        first.steps = Some(7);
        let mut second = TimeSlice::new(5);
        second.heart_rate = Some(90.0);
        let other = TimeSlice::new(2);

        let merged = ChartBuilder::merge_slices(vec![first, second, other]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].timestamp, 2);
        assert_eq!(merged[1].steps, Some(7));
        assert_eq!(merged[1].heart_rate, Some(90.0));
    }
}
