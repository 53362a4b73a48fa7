//! Suspicious-trip reclassification
//!
//! Audits vehicle and bicycle trips that no correction pass confirmed. A trip
//! whose mode barely shows up in the day's totals, or that covered almost no
//! ground, is demoted to a more plausible mode.

use crate::config::{EngineConfig, Thresholds};
use crate::corrector::has_step_evidence;
use crate::summary::SummaryAggregator;
use crate::types::{ActivityType, DailySummary, Trip};

pub struct SuspiciousTripReclassifier<'a> {
    thresholds: &'a Thresholds,
}

impl<'a> SuspiciousTripReclassifier<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            thresholds: &config.thresholds,
        }
    }

    /// Demote implausible unreliable trips, recomputing the day totals after
    /// every demotion.
    pub fn reclassify(&self, mut trips: Vec<Trip>) -> Vec<Trip> {
        let mut summary = SummaryAggregator::summarize(&trips);
        let mut demoted = 0;

        for i in 0..trips.len() {
            if trips[i].reliable {
                continue;
            }
            let Some(activity) = self.demotion(&trips[i], &summary) else {
                continue;
            };

            log::debug!(
                "Demoting {} trip at {} to {}",
                trips[i].activity.as_str(),
                trips[i].start_time,
                activity.as_str()
            );
            trips[i].reclassify(activity);
            summary = SummaryAggregator::summarize(&trips);
            demoted += 1;
        }

        if demoted > 0 {
            log::debug!("Reclassified {} suspicious trips", demoted);
        }
        trips
    }

    /// Mode a trip should be demoted to, if it is implausible
    pub fn demotion(&self, trip: &Trip, summary: &DailySummary) -> Option<ActivityType> {
        let duration = trip.duration();
        let (mode_total, alternative, alternative_total) = match trip.activity {
            ActivityType::InVehicle => (
                summary.vehicle_msecs,
                ActivityType::OnBicycle,
                summary.cycling_msecs,
            ),
            ActivityType::OnBicycle => (
                summary.cycling_msecs,
                ActivityType::InVehicle,
                summary.vehicle_msecs,
            ),
            _ => return None,
        };

        let implausible = mode_total < self.thresholds.day_share_factor.saturating_mul(duration)
            || trip.distance < self.thresholds.min_trip_distance_m;
        if !implausible {
            return None;
        }

        if alternative_total > duration && !self.is_radius_suspicious(trip) {
            Some(alternative)
        } else if has_step_evidence(trip, self.thresholds) {
            Some(ActivityType::Walking)
        } else {
            Some(ActivityType::Still)
        }
    }

    /// The trip never left the neighbourhood of the day's base location
    pub fn is_radius_suspicious(&self, trip: &Trip) -> bool {
        trip.radius < self.thresholds.min_travel_radius_m
    }
}
