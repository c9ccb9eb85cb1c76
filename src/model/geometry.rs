//! Great-circle distance helpers shared by the heuristic, stitching and
//! endpoint handling.

use geo::{Distance, Haversine, Point};

/// Great-circle distance between two coordinates in meters.
pub fn great_circle_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine::distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Travel time over a straight-line distance at the given speed in
/// meters per millisecond, rounded up. Never returns 0 for a positive
/// distance.
pub fn travel_ms(meters: f64, speed_m_per_ms: f64) -> u64 {
    let ms = (meters / speed_m_per_ms).ceil();
    if ms <= 0.0 {
        0
    } else {
        ms as u64
    }
}
