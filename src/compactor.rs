//! Trip compaction

use crate::types::Trip;

pub struct TripCompactor;

impl TripCompactor {
    /// Merge every run of adjacent same-mode trips into one trip
    pub fn compact(trips: Vec<Trip>) -> Vec<Trip> {
        let before = trips.len();
        let mut compacted: Vec<Trip> = Vec::with_capacity(trips.len());

        for trip in trips {
            match compacted.last_mut() {
                Some(last) if last.activity == trip.activity => absorb(last, trip),
                _ => compacted.push(trip),
            }
        }

        log::debug!("Compacted {} trips into {}", before, compacted.len());
        compacted
    }
}

fn absorb(into: &mut Trip, next: Trip) {
    let (d1, d2) = (into.duration(), next.duration());
    into.avg_heart_rate = match (into.avg_heart_rate, next.avg_heart_rate) {
        (Some(a), Some(b)) if d1 + d2 > 0 => Some((a * d1 as f64 + b * d2 as f64) / (d1 + d2) as f64),
        (Some(a), Some(_)) => Some(a),
        (a, b) => a.or(b),
    };

    into.end_index = next.end_index;
    into.end_time = next.end_time;
    into.steps += next.steps;
    into.distance += next.distance;
    into.radius = into.radius.max(next.radius);
    into.reliable = into.reliable && next.reliable;
    into.suspicious = into.suspicious || next.suspicious;
    into.locations.extend(next.locations);
}
