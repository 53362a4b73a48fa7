//! Trip segmentation
//!
//! Walks the chart and cuts it into trips at activity-transition boundaries.
//! Trips use closed chart ranges: a transition slice opens the new trip and
//! the previous trip ends on the slice before it.

use crate::chart::FLOW_SWAP_WINDOW_MS;
use crate::geometry::radius_of_gyration;
use crate::types::{ActivityType, Chart, Location, Trip};

impl Trip {
    /// Build a trip over chart slices `start..=end`, measuring everything the
    /// slices carry.
    pub fn from_chart(chart: &Chart, start: usize, end: usize, activity: ActivityType) -> Trip {
        let slices = &chart.slices[start..=end];

        // An increment covers the interval ending at its slice, so the one on
        // the next trip's opening slice still belongs here
        let step_end = (end + 2).min(chart.slices.len());
        let steps = chart.slices[start + 1..step_end]
            .iter()
            .filter_map(|s| s.step_increment)
            .sum();
        let distance = slices.iter().filter_map(|s| s.distance).sum();
        let locations: Vec<Location> = slices.iter().filter_map(|s| s.location.clone()).collect();

        let radius = match chart.base.as_ref() {
            Some(base) => radius_of_gyration(&locations, base),
            None => 0.0,
        };

        let heart_rates: Vec<f64> = slices.iter().filter_map(|s| s.heart_rate).collect();
        let avg_heart_rate = if heart_rates.is_empty() {
            None
        } else {
            Some(heart_rates.iter().sum::<f64>() / heart_rates.len() as f64)
        };

        Trip {
            start_index: start,
            end_index: end,
            start_time: chart.slices[start].timestamp,
            end_time: chart.end_timestamp(end),
            activity,
            steps,
            distance,
            radius,
            avg_heart_rate,
            reliable: false,
            suspicious: false,
            locations,
        }
    }
}

/// Cuts the chart into trips
pub struct TripSegmenter;

impl TripSegmenter {
    /// Segment the chart.
    ///
    /// Starts with an open STILL trip at index 0. Each transition slice closes
    /// the open trip (labelled with the exiting activity when there is one) and
    /// opens a new one with the entering activity, or UNKNOWN after a bare
    /// exit. The final trip always closes on the last slice.
    pub fn segment(chart: &Chart) -> Vec<Trip> {
        let mut trips = Vec::new();
        if chart.is_empty() {
            return trips;
        }

        let mut start = 0;
        let mut mode = ActivityType::Still;
        // Timestamp of a bare exit that opened the current UNKNOWN trip
        let mut pending_exit: Option<i64> = None;

        for (i, slice) in chart.slices.iter().enumerate() {
            if !slice.has_transition() {
                continue;
            }

            if i == start {
                match slice.activity_in {
                    Some(entering) => {
                        mode = entering;
                        pending_exit = None;
                    }
                    None => {
                        mode = ActivityType::Unknown;
                        pending_exit = Some(slice.timestamp);
                    }
                }
                continue;
            }

            if let (Some(entering), None, Some(exit_ts)) =
                (slice.activity_in, slice.activity_out, pending_exit)
            {
                if slice.timestamp - exit_ts <= FLOW_SWAP_WINDOW_MS {
                    mode = entering;
                    pending_exit = None;
                    continue;
                }
            }

            let closed_mode = slice.activity_out.unwrap_or(mode);
            trips.push(Trip::from_chart(chart, start, i - 1, closed_mode));
            start = i;

            match slice.activity_in {
                Some(entering) => {
                    mode = entering;
                    pending_exit = None;
                }
                None => {
                    mode = ActivityType::Unknown;
                    pending_exit = Some(slice.timestamp);
                }
            }
        }

        trips.push(Trip::from_chart(chart, start, chart.len() - 1, mode));

        log::debug!("Segmented chart into {} trips", trips.len());
        trips
    }
}

/// Check that `trips` tile the chart without gaps or overlaps
pub fn covers_chart(chart: &Chart, trips: &[Trip]) -> bool {
    let (Some(first), Some(last)) = (trips.first(), trips.last()) else {
        return chart.is_empty();
    };
    first.start_index == 0
        && last.end_index + 1 == chart.len()
        && trips
            .windows(2)
            .all(|pair| pair[0].end_index + 1 == pair[1].start_index)
        && trips.iter().all(|t| t.start_index <= t.end_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{chart_with, slice};
    use crate::types::TimeSlice;
    use pretty_assertions::assert_eq;

    fn modes(trips: &[Trip]) -> Vec<(usize, usize, ActivityType)> {
        trips
            .iter()
            .map(|t| (t.start_index, t.end_index, t.activity))
            .collect()
    }

    #[test]
    fn test_single_untagged_slice_is_one_still_trip() {
        let chart = chart_with(vec![TimeSlice::new(0)], 0, 86_400_000);
        let trips = TripSegmenter::segment(&chart);
        assert_eq!(modes(&trips), vec![(0, 0, ActivityType::Still)]);
        assert_eq!(trips[0].duration(), 86_400_000);
    }

    #[test]
    fn test_empty_chart_has_no_trips() {
        let chart = chart_with(Vec::new(), 0, 1000);
        assert!(TripSegmenter::segment(&chart).is_empty());
        assert!(covers_chart(&chart, &[]));
    }

    #[test]
    fn test_walk_between_stills() {
        let mut slices: Vec<TimeSlice> = (0..100).map(|i| slice(i * 60_000)).collect();
        slices[10].activity_in = Some(ActivityType::Walking);
        slices[50].activity_out = Some(ActivityType::Walking);
        slices[50].activity_in = Some(ActivityType::Still);
        let chart = chart_with(slices, 0, 100 * 60_000);

        let trips = TripSegmenter::segment(&chart);
        assert_eq!(
            modes(&trips),
            vec![
                (0, 9, ActivityType::Still),
                (10, 49, ActivityType::Walking),
                (50, 99, ActivityType::Still),
            ]
        );
        assert!(covers_chart(&chart, &trips));
        assert_eq!(trips[1].start_time, 10 * 60_000);
        assert_eq!(trips[1].end_time, 50 * 60_000);
    }

    #[test]
    fn test_exit_labels_the_closed_trip() {
        let mut slices: Vec<TimeSlice> = (0..10).map(|i| slice(i * 1000)).collect();
        slices[3].activity_in = Some(ActivityType::Walking);
        slices[6].activity_out = Some(ActivityType::Running);
        slices[6].activity_in = Some(ActivityType::Still);
        let chart = chart_with(slices, 0, 10_000);

        let trips = TripSegmenter::segment(&chart);
        assert_eq!(trips[1].activity, ActivityType::Running);
    }

    #[test]
    fn test_bare_exit_then_quick_enter_does_not_cut_twice() {
        let mut slices: Vec<TimeSlice> = (0..10).map(|i| slice(i * 1000)).collect();
        slices[4].activity_out = Some(ActivityType::Still);
        slices[5].activity_in = Some(ActivityType::InVehicle);
        let chart = chart_with(slices, 0, 10_000);

        let trips = TripSegmenter::segment(&chart);
        assert_eq!(
            modes(&trips),
            vec![(0, 3, ActivityType::Still), (4, 9, ActivityType::InVehicle)]
        );
    }

    #[test]
    fn test_bare_exit_with_late_enter_leaves_unknown_gap() {
        let mut slices: Vec<TimeSlice> = (0..10).map(|i| slice(i * 60_000)).collect();
        slices[4].activity_out = Some(ActivityType::Still);
        slices[7].activity_in = Some(ActivityType::Walking);
        let chart = chart_with(slices, 0, 600_000);

        let trips = TripSegmenter::segment(&chart);
        assert_eq!(
            modes(&trips),
            vec![
                (0, 3, ActivityType::Still),
                (4, 6, ActivityType::Unknown),
                (7, 9, ActivityType::Walking),
            ]
        );
    }

    #[test]
    fn test_tag_on_first_slice_relabels_open_trip() {
        let mut slices: Vec<TimeSlice> = (0..5).map(|i| slice(i * 1000)).collect();
        slices[0].activity_in = Some(ActivityType::OnBicycle);
        let chart = chart_with(slices, 0, 5000);

        let trips = TripSegmenter::segment(&chart);
        assert_eq!(modes(&trips), vec![(0, 4, ActivityType::OnBicycle)]);
    }

    #[test]
    fn test_trip_measures_steps_distance_and_heart_rate() {
        let mut slices: Vec<TimeSlice> = (0..4).map(|i| slice(i * 60_000)).collect();
        slices[1].step_increment = Some(40);
        slices[2].step_increment = Some(60);
        slices[1].distance = Some(30.0);
        slices[3].distance = Some(20.0);
        slices[0].heart_rate = Some(60.0);
        slices[2].heart_rate = Some(80.0);
        let chart = chart_with(slices, 0, 240_000);

        let trip = Trip::from_chart(&chart, 0, 3, ActivityType::Walking);
        assert_eq!(trip.steps, 100);
        assert_eq!(trip.distance, 50.0);
        assert_eq!(trip.avg_heart_rate, Some(70.0));
        assert_eq!(trip.duration(), 240_000);
        assert_eq!(trip.cadence(), Some(25.0));
    }

    #[test]
    fn test_steps_go_to_the_trip_they_were_walked_in() {
        let mut slices: Vec<TimeSlice> = (0..4).map(|i| slice(i * 60_000)).collect();
        slices[1].activity_in = Some(ActivityType::Walking);
        slices[2].activity_out = Some(ActivityType::Walking);
        slices[2].step_increment = Some(120);
        slices[3].step_increment = Some(5);
        let chart = chart_with(slices, 0, 240_000);

        let trips = TripSegmenter::segment(&chart);
        let steps: Vec<u64> = trips.iter().map(|t| t.steps).collect();
        assert_eq!(steps, vec![0, 120, 5]);
        assert_eq!(trips[1].activity, ActivityType::Walking);
    }
}
