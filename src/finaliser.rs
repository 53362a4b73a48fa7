//! Location finalisation
//!
//! Last pass over the compacted trips: collapses still trips to a single
//! representative location and stamps every chart slice with its trip's mode.

use crate::geometry::centroid;
use crate::types::{ActivityType, Chart, Location, Trip};

pub struct LocationFinaliser;

impl LocationFinaliser {
    pub fn finalise(chart: &mut Chart, trips: &mut [Trip], use_stay_points: bool) {
        for trip in trips.iter_mut() {
            let end = trip.end_index.min(chart.len().saturating_sub(1));
            let Some(slices) = chart.slices.get_mut(trip.start_index..=end) else {
                continue;
            };

            if use_stay_points && trip.activity == ActivityType::Still {
                let fixes: Vec<Location> = slices
                    .iter()
                    .flat_map(|s| {
                        if s.supporting.is_empty() {
                            s.location.iter().cloned().collect::<Vec<_>>()
                        } else {
                            s.supporting.clone()
                        }
                    })
                    .collect();
                if let Some(center) = centroid(&fixes) {
                    trip.locations = vec![center];
                }
            }

            for slice in slices.iter_mut() {
                slice.assigned_activity = Some(trip.activity);
            }
        }
    }
}
