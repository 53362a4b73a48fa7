//! Daily summary aggregation

use crate::types::{ActivityType, DailySummary, Trip};

/// Reduces a trip list to per-mode totals
pub struct SummaryAggregator;

impl SummaryAggregator {
    pub fn summarize(trips: &[Trip]) -> DailySummary {
        let mut summary = DailySummary {
            trip_count: trips.len(),
            ..Default::default()
        };

        for trip in trips {
            let duration = trip.duration();
            let km = trip.distance / 1000.0;

            match trip.activity {
                ActivityType::InVehicle => {
                    summary.vehicle_msecs += duration;
                    summary.vehicle_km += km;
                }
                ActivityType::OnBicycle => {
                    summary.cycling_msecs += duration;
                    summary.cycling_km += km;
                }
                ActivityType::Walking | ActivityType::OnFoot => {
                    summary.walking_msecs += duration;
                    summary.walking_km += km;
                }
                ActivityType::Running => {
                    summary.running_msecs += duration;
                    summary.running_km += km;
                }
                ActivityType::Still => {
                    summary.still_msecs += duration;
                    summary.still_km += km;
                }
                ActivityType::Unknown | ActivityType::Tilting => {
                    summary.other_msecs += duration;
                }
            }

            summary.total_steps += trip.steps;
            summary.max_radius = summary.max_radius.max(trip.radius);
        }

        summary
    }
}
