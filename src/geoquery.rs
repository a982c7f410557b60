use crate::config::MapConfig;
use crate::types::{Anchor, BoundaryFeature, RankedAnchor, Viewport};
use geo::{CoordsIter, Point};
use std::collections::{HashMap, HashSet};

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Great-circle distance between two (lon, lat) points, in miles.
pub fn haversine_miles(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Rank anchors by distance from a tract's centroid, closest first.
///
/// An unknown tract id yields an empty result rather than an error: the
/// caller is a UI panel that simply has nothing to show. Ties keep input
/// order (the sort is stable).
pub fn nearest_anchors(
    geoid: &str,
    category: Option<&str>,
    limit: usize,
    centroids: &HashMap<String, Point<f64>>,
    anchors: &[Anchor],
) -> Vec<RankedAnchor> {
    let origin = match centroids.get(geoid) {
        Some(point) => *point,
        None => return Vec::new(),
    };

    let mut ranked: Vec<RankedAnchor> = anchors
        .iter()
        .filter(|a| category.is_none_or(|c| a.category == c))
        .map(|a| RankedAnchor {
            anchor: a.clone(),
            distance_miles: haversine_miles(origin, Point::new(a.longitude, a.latitude)),
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
    ranked.truncate(limit);
    ranked
}

/// Frame a map view around a set of tracts.
///
/// An active tract overrides the target set and gets the tighter focus
/// zoom. Every vertex of every ring of the matching features feeds the
/// bounding box; its midpoint becomes the center. When nothing matches,
/// fall back to the configured state-wide view.
pub fn viewport_for(
    targets: &HashSet<String>,
    active: Option<&str>,
    boundaries: &[BoundaryFeature],
    map: &MapConfig,
) -> Viewport {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut matched = false;

    for feature in boundaries {
        let in_target = match active {
            Some(id) => feature.geoid == id,
            None => targets.contains(&feature.geoid),
        };
        if !in_target {
            continue;
        }
        for coord in feature.geometry.coords_iter() {
            matched = true;
            min_x = min_x.min(coord.x);
            min_y = min_y.min(coord.y);
            max_x = max_x.max(coord.x);
            max_y = max_y.max(coord.y);
        }
    }

    if !matched {
        return Viewport {
            center: map.default_center,
            zoom: map.default_zoom,
        };
    }

    Viewport {
        center: [(min_x + max_x) / 2.0, (min_y + max_y) / 2.0],
        zoom: if active.is_some() {
            map.focus_zoom
        } else {
            map.default_zoom
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    fn anchor(name: &str, category: &str, lon: f64, lat: f64) -> Anchor {
        Anchor {
            name: name.to_string(),
            category: category.to_string(),
            longitude: lon,
            latitude: lat,
            link: None,
        }
    }

    fn square_feature(geoid: &str, min_x: f64, min_y: f64, size: f64) -> BoundaryFeature {
        BoundaryFeature {
            geoid: geoid.to_string(),
            geometry: MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![
                    (min_x, min_y),
                    (min_x + size, min_y),
                    (min_x + size, min_y + size),
                    (min_x, min_y + size),
                ]),
                vec![],
            )]),
        }
    }

    fn test_map() -> MapConfig {
        MapConfig {
            default_center: [-91.9623, 30.9843],
            default_zoom: 7.0,
            focus_zoom: 11.0,
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Baton Rouge to New Orleans is roughly 70-80 miles.
        let baton_rouge = Point::new(-91.1871, 30.4515);
        let new_orleans = Point::new(-90.0715, 29.9511);
        let miles = haversine_miles(baton_rouge, new_orleans);
        assert!((65.0..90.0).contains(&miles), "got {miles}");
    }

    #[test]
    fn haversine_of_identical_points_is_zero() {
        let p = Point::new(-91.0, 30.0);
        assert_eq!(haversine_miles(p, p), 0.0);
    }

    #[test]
    fn nearest_anchors_sorted_ascending_and_limited() {
        let mut centroids = HashMap::new();
        centroids.insert("22033070100".to_string(), Point::new(-91.0, 30.0));
        let anchors = vec![
            anchor("Far", "Port", -89.0, 29.0),
            anchor("Near", "Port", -91.01, 30.01),
            anchor("Mid", "Port", -90.5, 29.8),
        ];

        let ranked = nearest_anchors("22033070100", None, 2, &centroids, &anchors);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].anchor.name, "Near");
        assert_eq!(ranked[1].anchor.name, "Mid");
        assert!(ranked[0].distance_miles <= ranked[1].distance_miles);
    }

    #[test]
    fn nearest_anchors_honors_category_filter() {
        let mut centroids = HashMap::new();
        centroids.insert("22033070100".to_string(), Point::new(-91.0, 30.0));
        let anchors = vec![
            anchor("Port A", "Port", -91.1, 30.1),
            anchor("LSU", "University", -91.18, 30.41),
            anchor("Port B", "Port", -90.9, 29.9),
        ];

        let ranked = nearest_anchors("22033070100", Some("University"), 10, &centroids, &anchors);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].anchor.name, "LSU");
    }

    #[test]
    fn nearest_anchors_unknown_tract_is_empty() {
        let centroids = HashMap::new();
        let anchors = vec![anchor("Port A", "Port", -91.0, 30.0)];
        assert!(nearest_anchors("99999999999", None, 5, &centroids, &anchors).is_empty());
    }

    #[test]
    fn viewport_center_lies_inside_single_tract_bbox() {
        let features = vec![square_feature("22033070100", -91.5, 30.2, 0.2)];
        let view = viewport_for(&HashSet::new(), Some("22033070100"), &features, &test_map());
        assert!(view.center[0] > -91.5 && view.center[0] < -91.3);
        assert!(view.center[1] > 30.2 && view.center[1] < 30.4);
        assert_eq!(view.zoom, 11.0);
    }

    #[test]
    fn focused_zoom_is_tighter_than_broad_zoom() {
        let features = vec![
            square_feature("22033070100", -91.5, 30.2, 0.2),
            square_feature("22071001700", -90.1, 29.9, 0.2),
        ];
        let targets: HashSet<String> = ["22033070100", "22071001700"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let broad = viewport_for(&targets, None, &features, &test_map());
        let focused = viewport_for(&targets, Some("22033070100"), &features, &test_map());
        assert!(focused.zoom > broad.zoom);
    }

    #[test]
    fn active_tract_overrides_target_set() {
        let features = vec![
            square_feature("22033070100", -91.5, 30.2, 0.2),
            square_feature("22071001700", -90.1, 29.9, 0.2),
        ];
        let targets: HashSet<String> = ["22071001700"].iter().map(|s| s.to_string()).collect();

        let view = viewport_for(&targets, Some("22033070100"), &features, &test_map());
        // Centered on the active tract, not the one in the target set.
        assert!(view.center[0] < -91.0);
    }

    #[test]
    fn no_match_falls_back_to_state_view() {
        let features = vec![square_feature("22033070100", -91.5, 30.2, 0.2)];
        let view = viewport_for(&HashSet::new(), None, &features, &test_map());
        assert_eq!(view.center, [-91.9623, 30.9843]);
        assert_eq!(view.zoom, 7.0);
    }
}
