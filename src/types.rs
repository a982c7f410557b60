use geo::{Point, MultiPolygon};
use serde::Serialize;
use std::collections::HashMap;

/// Derived from the master table's eligibility source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Eligibility {
    Eligible,
    Ineligible,
}

#[derive(Debug, Clone, Serialize)]
pub struct TractRecord {
    /// 11-digit zero-padded census tract identifier.
    pub geoid: String,
    pub region: String,
    pub parish: String,
    pub eligibility: Eligibility,
    pub poverty_rate: f64,
    pub median_income: f64,
    pub unemployment_rate: f64,
    pub population: i64,
    pub labor_force: i64,
    pub broadband_pct: f64,
    pub metro_status: String,
    pub program_status: String,
}

#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub geoid: String,
    pub geometry: MultiPolygon<f64>,
}

/// A named point of interest (port, university, hospital, ...).
#[derive(Debug, Clone, Serialize)]
pub struct Anchor {
    pub name: String,
    pub category: String,
    pub longitude: f64,
    pub latitude: f64,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedAnchor {
    pub anchor: Anchor,
    pub distance_miles: f64,
}

/// A user-authored entry in the session report.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub geoid: String,
    pub category: String,
    pub justification: String,
}

/// Map framing: bounding-box midpoint plus a zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    /// (lon, lat)
    pub center: [f64; 2],
    pub zoom: f64,
}

/// Everything one dataset load produces.
#[derive(Debug)]
pub struct DataBundle {
    pub tracts: Vec<TractRecord>,
    pub anchors: Vec<Anchor>,
    pub boundaries: Vec<BoundaryFeature>,
    pub centroids: HashMap<String, Point<f64>>,
}
