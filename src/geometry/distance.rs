use geo::{Closest, ClosestPoint, LineString, Point};

/// Earth radius used by every ground-distance computation, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Equirectangular approximation of the ground distance between two
/// coordinates, in kilometres. Points are (x = lon, y = lat) degrees.
pub fn ground_distance_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lon1 = a.x().to_radians();
    let lat2 = b.y().to_radians();
    let lon2 = b.x().to_radians();

    let x = (lon2 - lon1) * ((lat1 + lat2) / 2.0).cos();
    let y = lat2 - lat1;

    (x * x + y * y).sqrt() * EARTH_RADIUS_KM
}

pub fn ground_distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    ground_distance_km(a, b) * 1000.0
}

/// Nearest point on `line` to `p`, projected in coordinate space.
/// None when the line is empty.
pub fn project_onto_line(line: &LineString<f64>, p: Point<f64>) -> Option<Point<f64>> {
    match line.closest_point(&p) {
        Closest::Intersection(found) | Closest::SinglePoint(found) => Some(found),
        Closest::Indeterminate => None,
    }
}
