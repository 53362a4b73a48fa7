//! Location geometry
//!
//! Great-circle distances, time interpolation along a chord, and the
//! centroid/radius helpers used by the cleaner, the summary and the finaliser.

use crate::types::Location;

/// Mean Earth radius (meters)
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two fixes in meters
pub fn distance(a: &Location, b: &Location) -> f64 {
    haversine(a.latitude, a.longitude, b.latitude, b.longitude)
}

fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Speed in m/s between two fixes, `None` when no time elapsed
pub fn speed(a: &Location, b: &Location) -> Option<f64> {
    let dt_sec = (b.timestamp - a.timestamp) as f64 / 1000.0;
    if dt_sec <= 0.0 {
        return None;
    }
    Some(distance(a, b) / dt_sec)
}

/// Position on the chord `start -> end` at time `timestamp`
pub fn interpolate(start: &Location, end: &Location, timestamp: i64) -> Location {
    let span = (end.timestamp - start.timestamp) as f64;
    let ratio = if span > 0.0 {
        ((timestamp - start.timestamp) as f64 / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Location::new(
        timestamp,
        start.latitude + (end.latitude - start.latitude) * ratio,
        start.longitude + (end.longitude - start.longitude) * ratio,
    )
}

/// Synchronous Euclidean distance of `point` from the chord `start -> end`.
///
/// The reference is the chord position at the point's own timestamp, not the
/// closest point on the chord.
pub fn synchronous_distance(start: &Location, end: &Location, point: &Location) -> f64 {
    let expected = interpolate(start, end, point.timestamp);
    distance(&expected, point)
}

/// Mean position of a set of fixes, stamped with the first fix's timestamp
pub fn centroid(points: &[Location]) -> Option<Location> {
    let first = points.first()?;
    let n = points.len() as f64;
    let latitude = points.iter().map(|p| p.latitude).sum::<f64>() / n;
    let longitude = points.iter().map(|p| p.longitude).sum::<f64>() / n;

    let altitudes: Vec<f64> = points.iter().filter_map(|p| p.altitude).collect();
    let altitude = if altitudes.is_empty() {
        None
    } else {
        Some(altitudes.iter().sum::<f64>() / altitudes.len() as f64)
    };

    Some(Location {
        timestamp: first.timestamp,
        latitude,
        longitude,
        altitude,
        accuracy: None,
    })
}

/// Largest distance from any of `points` to `base` (meters)
pub fn radius_of_gyration<'a>(points: impl IntoIterator<Item = &'a Location>, base: &Location) -> f64 {
    points
        .into_iter()
        .map(|p| distance(p, base))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Location::new(0, 0.0, 0.0);
        let b = Location::new(0, 1.0, 0.0);
        let d = distance(&a, &b);
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_distance_is_zero_for_same_point() {
        let a = Location::new(0, 45.5, 9.2);
        assert!(distance(&a, &a).abs() < 1e-9);
    }

    #[test]
    fn test_speed_requires_elapsed_time() {
        let a = Location::new(0, 0.0, 0.0);
        let b = Location::new(10_000, 0.001, 0.0);
        let s = speed(&a, &b).unwrap();
        assert!((s - 11.12).abs() < 0.1);
        assert!(speed(&b, &a).is_none());
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Location::new(0, 0.0, 0.0);
        let b = Location::new(100, 1.0, 2.0);
        let mid = interpolate(&a, &b, 50);
        assert!((mid.latitude - 0.5).abs() < 1e-9);
        assert!((mid.longitude - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_synchronous_distance_uses_time_not_space() {
        let a = Location::new(0, 0.0, 0.0);
        let b = Location::new(100, 0.0, 0.01);
        // On the chord spatially, but far from where it should be at t=10
        let early = Location::new(10, 0.0, 0.009);
        assert!(synchronous_distance(&a, &b, &early) > 800.0);
        let on_time = Location::new(90, 0.0, 0.009);
        assert!(synchronous_distance(&a, &b, &on_time) < 1.0);
    }

    #[test]
    fn test_centroid_and_radius() {
        let points = vec![
            Location::new(5, 0.0, 0.0),
            Location::new(6, 0.0, 0.002),
        ];
        let c = centroid(&points).unwrap();
        assert_eq!(c.timestamp, 5);
        assert!((c.longitude - 0.001).abs() < 1e-12);
        assert!(centroid(&[]).is_none());

        let base = Location::new(0, 0.0, 0.0);
        let r = radius_of_gyration(&points, &base);
        assert!((r - 222.4).abs() < 1.0);
    }
}
