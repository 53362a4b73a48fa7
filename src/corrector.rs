//! Trip correction
//!
//! Multi-pass heuristics that repair the segmenter's raw trips. Each pass
//! takes the trip list by value and returns the corrected list; the passes
//! run in a fixed order because later ones rely on the labels of earlier ones.

use crate::config::{EngineConfig, Thresholds};
use crate::types::{ActivityType, Chart, Trip};

/// A labelled closed range of chart indices
#[derive(Debug, Clone, Copy, PartialEq)]
struct Run {
    start: usize,
    end: usize,
    activity: ActivityType,
}

/// Runs every correction pass over the segmenter output
pub struct TripCorrector<'a> {
    chart: &'a Chart,
    config: &'a EngineConfig,
}

impl<'a> TripCorrector<'a> {
    pub fn new(chart: &'a Chart, config: &'a EngineConfig) -> Self {
        Self { chart, config }
    }

    /// Apply all passes in order
    pub fn correct(&self, trips: Vec<Trip>) -> Vec<Trip> {
        let short_ms = self.config.short_activity_ms;
        let thresholds = &self.config.thresholds;
        let segmented = trips.len();

        // Pass 1: Recover activities hidden inside long stills
        let trips = self.recover_lost_activities(trips);

        // Pass 2: Short stills take the mode of their longer neighbour
        let trips = remove_short_stills(trips, short_ms);

        // Pass 3: Vehicle between two bicycle legs
        let trips = merge_bike_vehicle_bike(trips);

        // Pass 4: Fast short walk between two vehicle legs
        let trips = fix_vehicle_walk_vehicle(trips, short_ms, thresholds.walk_in_vehicle_speed_mps);

        // Pass 5: Mark trips whose evidence supports their mode
        let trips = confirm_reliable(trips, thresholds);

        log::debug!(
            "Corrected {} segmented trips into {} ({} reliable)",
            segmented,
            trips.len(),
            trips.iter().filter(|t| t.reliable).count()
        );

        trips
    }

    /// Re-segment long STILL/UNKNOWN trips that carry movement evidence.
    ///
    /// With walking evidence the trip is split by per-slice cadence. Otherwise
    /// the longest fast-moving stretch, if long enough, becomes a vehicle trip.
    pub fn recover_lost_activities(&self, trips: Vec<Trip>) -> Vec<Trip> {
        let thresholds = &self.config.thresholds;
        let min_duration = 2 * self.config.short_activity_ms;
        let mut recovered = Vec::with_capacity(trips.len());

        for trip in trips {
            if !trip.activity.is_stationary() || trip.duration() <= min_duration {
                recovered.push(trip);
                continue;
            }

            let walking_evidence = trip
                .cadence()
                .is_some_and(|c| c > thresholds.walking_cadence_spm)
                || trip.steps > thresholds.recovery_min_steps;

            let runs = if walking_evidence {
                self.cadence_runs(&trip)
            } else {
                self.hidden_vehicle_runs(&trip)
            };

            if runs.len() == 1 && runs[0].activity == trip.activity {
                recovered.push(trip);
                continue;
            }

            log::debug!(
                "Recovered {} sub-trips from {} trip at {}",
                runs.len(),
                trip.activity.as_str(),
                trip.start_time
            );
            recovered.extend(runs.into_iter().map(|run| self.sub_trip(&trip, run)));
        }

        recovered
    }

    fn sub_trip(&self, parent: &Trip, run: Run) -> Trip {
        let mut trip = Trip::from_chart(self.chart, run.start, run.end, run.activity);
        trip.suspicious = parent.suspicious || run.activity != parent.activity;
        trip
    }

    fn run_duration(&self, run: &Run) -> i64 {
        self.chart.end_timestamp(run.end) - self.chart.slices[run.start].timestamp
    }

    fn cadence_runs(&self, trip: &Trip) -> Vec<Run> {
        let short_ms = self.config.short_activity_ms;

        let mut runs: Vec<Run> = Vec::new();
        for index in trip.start_index..=trip.end_index {
            let current = self.slice_evidence(index).unwrap_or(trip.activity);
            match runs.last_mut() {
                Some(run) if run.activity == current => run.end = index,
                _ => runs.push(Run {
                    start: index,
                    end: index,
                    activity: current,
                }),
            }
        }

        // Short runs fold into the run before them
        let mut absorbed: Vec<Run> = Vec::with_capacity(runs.len());
        for run in runs {
            match absorbed.last_mut() {
                Some(previous) if self.run_duration(&run) < short_ms => previous.end = run.end,
                _ => absorbed.push(run),
            }
        }
        if absorbed.len() > 1 && self.run_duration(&absorbed[0]) < short_ms {
            absorbed[1].start = absorbed[0].start;
            absorbed.remove(0);
        }

        let mut merged: Vec<Run> = Vec::with_capacity(absorbed.len());
        for run in absorbed {
            match merged.last_mut() {
                Some(previous) if previous.activity == run.activity => previous.end = run.end,
                _ => merged.push(run),
            }
        }
        merged
    }

    /// Mode suggested for the interval starting at slice `index`.
    ///
    /// Cadence comes from the first step reading after the slice, whose
    /// increment covers the interval; speed from the next slice. Past the
    /// last reading there is no step evidence.
    fn slice_evidence(&self, index: usize) -> Option<ActivityType> {
        let following = self.chart.slices.get(index + 1..)?;
        let next = following.first()?;
        let cadence = following
            .iter()
            .find(|s| s.steps.is_some())
            .and_then(|s| s.cadence);
        classify(cadence, next.speed, &self.config.thresholds)
    }

    fn hidden_vehicle_runs(&self, trip: &Trip) -> Vec<Run> {
        let whole = vec![Run {
            start: trip.start_index,
            end: trip.end_index,
            activity: trip.activity,
        }];
        let Some((start, end)) = self.longest_vehicle_stretch(trip) else {
            return whole;
        };

        let mut runs = Vec::with_capacity(3);
        if start > trip.start_index {
            runs.push(Run {
                start: trip.start_index,
                end: start - 1,
                activity: trip.activity,
            });
        }
        runs.push(Run {
            start,
            end,
            activity: ActivityType::InVehicle,
        });
        if end < trip.end_index {
            runs.push(Run {
                start: end + 1,
                end: trip.end_index,
                activity: trip.activity,
            });
        }
        runs
    }

    /// Longest qualifying stretch of vehicle-speed movement inside `trip`.
    ///
    /// A stretch starts at the last fix before the speed first exceeds the
    /// vehicle threshold and ends at the last fast fix; slower fixes shorter
    /// than the stop tolerance do not interrupt it.
    fn longest_vehicle_stretch(&self, trip: &Trip) -> Option<(usize, usize)> {
        let thresholds = &self.config.thresholds;
        let slices = &self.chart.slices;

        let mut stretches: Vec<(usize, usize)> = Vec::new();
        let mut open: Option<(usize, usize)> = None;
        let mut last_located: Option<usize> = None;

        for index in trip.start_index..=trip.end_index {
            let slice = &slices[index];
            if let Some(speed) = slice.speed {
                let timestamp = slice.timestamp;
                let stopped_too_long = |last_fast: usize| {
                    timestamp - slices[last_fast].timestamp > thresholds.vehicle_stop_tolerance_ms
                };

                if speed > thresholds.vehicle_speed_mps {
                    open = match open {
                        Some((start, last_fast)) if !stopped_too_long(last_fast) => Some((start, index)),
                        previous => {
                            if let Some(stretch) = previous {
                                stretches.push(stretch);
                            }
                            Some((last_located.unwrap_or(index), index))
                        }
                    };
                } else if let Some((start, last_fast)) = open {
                    if stopped_too_long(last_fast) {
                        stretches.push((start, last_fast));
                        open = None;
                    }
                }
            }
            if slice.location.is_some() {
                last_located = Some(index);
            }
        }
        if let Some(stretch) = open {
            stretches.push(stretch);
        }

        stretches
            .into_iter()
            .map(|(start, end)| {
                let run = Run {
                    start,
                    end,
                    activity: ActivityType::InVehicle,
                };
                let distance: f64 = slices[start..=end].iter().filter_map(|s| s.distance).sum();
                (start, end, self.run_duration(&run), distance)
            })
            .filter(|&(_, _, duration, distance)| {
                duration >= self.config.short_activity_ms
                    && distance >= thresholds.hidden_vehicle_min_distance_m
            })
            .max_by_key(|&(_, _, duration, _)| duration)
            .map(|(start, end, _, _)| (start, end))
    }
}

/// Mode suggested by a cadence and speed, if either is known
fn classify(cadence: Option<f64>, speed: Option<f64>, thresholds: &Thresholds) -> Option<ActivityType> {
    if let Some(cadence) = cadence {
        if cadence >= thresholds.running_cadence_spm {
            return Some(ActivityType::Running);
        }
        if cadence >= thresholds.walking_cadence_spm {
            return Some(ActivityType::Walking);
        }
    }
    match speed {
        Some(speed) if speed >= thresholds.vehicle_confirm_speed_mps => Some(ActivityType::InVehicle),
        _ if cadence.is_some() => Some(ActivityType::Still),
        _ => None,
    }
}

/// A STILL trip shorter than `short_ms` takes the mode of its longer
/// neighbour, when that neighbour outlasts it.
pub fn remove_short_stills(mut trips: Vec<Trip>, short_ms: i64) -> Vec<Trip> {
    for i in 0..trips.len() {
        let duration = trips[i].duration();
        if trips[i].activity != ActivityType::Still || duration >= short_ms {
            continue;
        }

        let previous = i.checked_sub(1);
        let next = (i + 1 < trips.len()).then_some(i + 1);
        let longer = match (previous, next) {
            (Some(p), Some(n)) if trips[n].duration() > trips[p].duration() => n,
            (Some(p), _) => p,
            (None, Some(n)) => n,
            (None, None) => continue,
        };

        if trips[longer].duration() > duration {
            let activity = trips[longer].activity;
            trips[i].reclassify(activity);
        }
    }
    trips
}

/// VEHICLE between two BICYCLE legs that together outlast it becomes BICYCLE
pub fn merge_bike_vehicle_bike(mut trips: Vec<Trip>) -> Vec<Trip> {
    for i in 1..trips.len().saturating_sub(1) {
        let (before, current, after) = (&trips[i - 1], &trips[i], &trips[i + 1]);
        if current.activity == ActivityType::InVehicle
            && before.activity == ActivityType::OnBicycle
            && after.activity == ActivityType::OnBicycle
            && before.duration() + after.duration() > current.duration()
        {
            trips[i].reclassify(ActivityType::OnBicycle);
            trips[i].reliable = true;
        }
    }
    trips
}

/// A short on-foot trip between two VEHICLE legs moving faster than
/// `min_speed_mps` becomes VEHICLE.
pub fn fix_vehicle_walk_vehicle(mut trips: Vec<Trip>, short_ms: i64, min_speed_mps: f64) -> Vec<Trip> {
    for i in 1..trips.len().saturating_sub(1) {
        let (before, current, after) = (&trips[i - 1], &trips[i], &trips[i + 1]);
        if current.activity.is_on_foot()
            && current.duration() < short_ms
            && before.activity == ActivityType::InVehicle
            && after.activity == ActivityType::InVehicle
            && current.speed().is_some_and(|s| s > min_speed_mps)
        {
            trips[i].reclassify(ActivityType::InVehicle);
            trips[i].reliable = true;
        }
    }
    trips
}

/// Mark trips as reliable when their own measurements support their mode
pub fn confirm_reliable(mut trips: Vec<Trip>, thresholds: &Thresholds) -> Vec<Trip> {
    for trip in trips.iter_mut().filter(|t| !t.reliable) {
        trip.reliable = supports_mode(trip, thresholds);
    }
    trips
}

fn supports_mode(trip: &Trip, thresholds: &Thresholds) -> bool {
    let speed = trip.speed().unwrap_or(0.0);
    match trip.activity {
        ActivityType::InVehicle => {
            speed >= thresholds.vehicle_confirm_speed_mps
                && trip.distance >= thresholds.vehicle_confirm_distance_m
        }
        ActivityType::OnBicycle => {
            (thresholds.bicycle_min_speed_mps..=thresholds.bicycle_max_speed_mps).contains(&speed)
                && trip.distance >= thresholds.min_trip_distance_m
        }
        ActivityType::Walking | ActivityType::Running | ActivityType::OnFoot => {
            has_step_evidence(trip, thresholds)
        }
        ActivityType::Still => trip.distance < thresholds.min_trip_distance_m,
        ActivityType::Unknown | ActivityType::Tilting => false,
    }
}

/// Cadence or step count high enough to call the trip on-foot
pub fn has_step_evidence(trip: &Trip, thresholds: &Thresholds) -> bool {
    trip.cadence().is_some_and(|c| c > thresholds.walking_cadence_spm)
        || trip.steps > thresholds.demotion_min_steps
}
