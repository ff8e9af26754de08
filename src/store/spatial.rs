//! Geodesic geometry predicates shared by validation, the predictor, and
//! both store backends.
//!
//! All coordinates are WGS84 degrees. Areas are geodesic (ellipsoidal)
//! square meters; distances are haversine meters. Pure functions only.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    BooleanOps, Coord, GeodesicArea, HaversineDestination, HaversineDistance, Line, LineString,
    Point, Polygon,
};

use crate::types::{GeoPoint, PolygonRing};

/// Convert the wire representation to a `geo::Polygon` (exterior only).
pub fn to_geo_polygon(ring: &PolygonRing) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = ring
        .points
        .iter()
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect();
    Polygon::new(LineString::from(coords), vec![])
}

/// Convert a `geo::Polygon` exterior back to the wire representation.
pub fn from_geo_polygon(polygon: &Polygon<f64>) -> PolygonRing {
    PolygonRing::new(
        polygon
            .exterior()
            .coords()
            .map(|c| GeoPoint::new(c.y, c.x))
            .collect(),
    )
}

/// Polygon validity: a closed simple ring of at least 4 vertices with
/// finite in-range coordinates and non-zero area.
pub fn spatial_valid(ring: &PolygonRing) -> bool {
    if ring.len() < 4 || !ring.is_closed() {
        return false;
    }
    for p in &ring.points {
        if !p.lat.is_finite() || !p.lon.is_finite() {
            return false;
        }
        if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
            return false;
        }
    }
    if has_self_intersection(ring) {
        return false;
    }
    area_meters(ring) > 0.0
}

/// Geodesic (unsigned) area of the ring, square meters.
pub fn area_meters(ring: &PolygonRing) -> f64 {
    to_geo_polygon(ring).geodesic_area_unsigned()
}

/// Geodesic area in hectares.
pub fn area_hectares(ring: &PolygonRing) -> f64 {
    area_meters(ring) / 10_000.0
}

/// Haversine distance between two points, meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    Point::new(a.lon, a.lat).haversine_distance(&Point::new(b.lon, b.lat))
}

/// The point `distance_m` meters from `origin` along `bearing_deg`
/// (clockwise from north).
pub fn destination(origin: GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let p = Point::new(origin.lon, origin.lat).haversine_destination(bearing_deg, distance_m);
    GeoPoint::new(p.y(), p.x())
}

/// Initial great-circle bearing from `a` to `b`, degrees clockwise from
/// north in [0, 360).
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// True when the ring contains the point.
pub fn contains_point(ring: &PolygonRing, p: GeoPoint) -> bool {
    use geo::Contains;
    to_geo_polygon(ring).contains(&Point::new(p.lon, p.lat))
}

/// Intersection of two rings. Returns the largest resulting polygon as a
/// ring, or `None` when the rings are disjoint.
pub fn intersection(a: &PolygonRing, b: &PolygonRing) -> Option<(PolygonRing, f64)> {
    let multi = to_geo_polygon(a).intersection(&to_geo_polygon(b));
    multi
        .into_iter()
        .map(|p| {
            let area = p.geodesic_area_unsigned();
            (from_geo_polygon(&p), area)
        })
        .filter(|(ring, area)| ring.len() >= 4 && *area > 0.0)
        .max_by(|(_, a1), (_, a2)| a1.partial_cmp(a2).unwrap_or(std::cmp::Ordering::Equal))
}

/// True when any non-adjacent pair of ring segments crosses.
fn has_self_intersection(ring: &PolygonRing) -> bool {
    let pts = &ring.points;
    let n = pts.len() - 1; // closing vertex duplicates the first
    if n < 3 {
        return false;
    }
    let seg = |i: usize| {
        Line::new(
            Coord { x: pts[i].lon, y: pts[i].lat },
            Coord { x: pts[i + 1].lon, y: pts[i + 1].lat },
        )
    };
    for i in 0..n {
        for j in (i + 1)..n {
            // Skip adjacent segments (shared endpoint) including the wrap
            // between last and first.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if let Some(LineIntersection::SinglePoint { is_proper: true, .. }) =
                line_intersection(seg(i), seg(j))
            {
                return true;
            }
        }
    }
    false
}

/// Build a closed square ring of approximately `side_m` meters centered on
/// `center`. Used by the seed generator and tests.
pub fn square_around(center: GeoPoint, side_m: f64) -> PolygonRing {
    let half = side_m / 2.0;
    let north = destination(center, 0.0, half);
    let south = destination(center, 180.0, half);
    let east = destination(center, 90.0, half);
    let west = destination(center, 270.0, half);
    let nw = GeoPoint::new(north.lat, west.lon);
    let ne = GeoPoint::new(north.lat, east.lon);
    let se = GeoPoint::new(south.lat, east.lon);
    let sw = GeoPoint::new(south.lat, west.lon);
    PolygonRing::new(vec![nw, ne, se, sw, nw])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sacramento() -> GeoPoint {
        GeoPoint::new(38.58, -121.49)
    }

    #[test]
    fn square_ring_is_valid_and_sized() {
        // ~707 m side ≈ 50 ha
        let ring = square_around(sacramento(), 707.0);
        assert!(spatial_valid(&ring));
        let ha = area_hectares(&ring);
        assert!((45.0..55.0).contains(&ha), "expected ~50 ha, got {ha}");
    }

    #[test]
    fn open_ring_is_invalid() {
        let mut ring = square_around(sacramento(), 500.0);
        ring.points.pop();
        assert!(!spatial_valid(&ring));
    }

    #[test]
    fn bowtie_is_invalid() {
        // Crossing diagonals produce a self-intersection
        let ring = PolygonRing::new(vec![
            GeoPoint::new(38.0, -121.0),
            GeoPoint::new(38.01, -120.99),
            GeoPoint::new(38.01, -121.0),
            GeoPoint::new(38.0, -120.99),
            GeoPoint::new(38.0, -121.0),
        ]);
        assert!(!spatial_valid(&ring));
    }

    #[test]
    fn too_few_points_is_invalid() {
        let ring = PolygonRing::new(vec![
            GeoPoint::new(38.0, -121.0),
            GeoPoint::new(38.01, -121.0),
            GeoPoint::new(38.0, -121.0),
        ]);
        assert!(!spatial_valid(&ring));
    }

    #[test]
    fn out_of_range_coordinates_are_invalid() {
        let ring = PolygonRing::new(vec![
            GeoPoint::new(91.0, -121.0),
            GeoPoint::new(91.0, -120.99),
            GeoPoint::new(90.9, -120.99),
            GeoPoint::new(91.0, -121.0),
        ]);
        assert!(!spatial_valid(&ring));
    }

    #[test]
    fn destination_round_trip() {
        let origin = sacramento();
        let moved = destination(origin, 90.0, 2_000.0);
        let back = distance_meters(origin, moved);
        assert!((back - 2_000.0).abs() < 5.0, "distance {back}");
    }

    #[test]
    fn bearing_matches_destination_direction() {
        let origin = sacramento();
        for expected in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let target = destination(origin, expected, 5_000.0);
            let measured = bearing_deg(origin, target);
            let diff = (measured - expected).abs().min(360.0 - (measured - expected).abs());
            assert!(diff < 1.0, "bearing {measured} vs {expected}");
        }
    }

    #[test]
    fn containment_inside_and_outside() {
        let ring = square_around(sacramento(), 1_000.0);
        assert!(contains_point(&ring, sacramento()));
        let outside = destination(sacramento(), 90.0, 2_000.0);
        assert!(!contains_point(&ring, outside));
    }

    #[test]
    fn overlapping_squares_intersect() {
        let a = square_around(sacramento(), 1_000.0);
        let b = square_around(destination(sacramento(), 90.0, 500.0), 1_000.0);
        let (ring, area) = intersection(&a, &b).expect("overlap expected");
        assert!(ring.len() >= 4);
        assert!(area > 0.0);

        let far = square_around(destination(sacramento(), 90.0, 10_000.0), 1_000.0);
        assert!(intersection(&a, &far).is_none());
    }
}
