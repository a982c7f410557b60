use crate::types::BoundaryFeature;
use geo::Point;
use std::collections::HashMap;

/// Build the tract id -> representative point lookup.
///
/// The point is the arithmetic mean of the outer-ring vertices of the
/// feature's first polygon, not an area-weighted centroid. That is fine
/// here: it only drives anchor proximity ranking and viewport framing,
/// never precise geometry. Features with empty geometry get no entry.
pub fn centroid_lookup(features: &[BoundaryFeature]) -> HashMap<String, Point<f64>> {
    let mut lookup = HashMap::new();
    for feature in features {
        if let Some(point) = outer_ring_mean(feature) {
            lookup.insert(feature.geoid.clone(), point);
        }
    }
    lookup
}

fn outer_ring_mean(feature: &BoundaryFeature) -> Option<Point<f64>> {
    let first = feature.geometry.0.first()?;
    let ring = first.exterior();
    if ring.0.is_empty() {
        return None;
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for coord in &ring.0 {
        sum_x += coord.x;
        sum_y += coord.y;
    }
    let n = ring.0.len() as f64;
    Some(Point::new(sum_x / n, sum_y / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(min_x: f64, min_y: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (min_x + size, min_y),
                (min_x + size, min_y + size),
                (min_x, min_y + size),
            ]),
            vec![],
        )
    }

    #[test]
    fn centroid_of_square_is_its_middle() {
        let feature = BoundaryFeature {
            geoid: "22033070100".to_string(),
            geometry: MultiPolygon::new(vec![square(-92.0, 30.0, 2.0)]),
        };
        let lookup = centroid_lookup(&[feature]);
        let point = lookup["22033070100"];
        // The closing vertex repeats the first one, so the mean is pulled
        // slightly toward it; it must still land inside the square.
        assert!(point.x() > -92.0 && point.x() < -90.0);
        assert!(point.y() > 30.0 && point.y() < 32.0);
    }

    #[test]
    fn multipolygon_uses_first_member_only() {
        let feature = BoundaryFeature {
            geoid: "22071001700".to_string(),
            geometry: MultiPolygon::new(vec![square(0.0, 0.0, 1.0), square(100.0, 100.0, 1.0)]),
        };
        let lookup = centroid_lookup(&[feature]);
        let point = lookup["22071001700"];
        assert!(point.x() < 2.0, "second member must not influence the centroid");
        assert!(point.y() < 2.0);
    }

    #[test]
    fn empty_geometry_is_skipped() {
        let feature = BoundaryFeature {
            geoid: "22000000000".to_string(),
            geometry: MultiPolygon::new(vec![]),
        };
        let lookup = centroid_lookup(&[feature]);
        assert!(lookup.is_empty());
    }
}
