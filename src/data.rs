use crate::centroid;
use crate::config::AppConfig;
use crate::types::{Anchor, BoundaryFeature, DataBundle, Eligibility, TractRecord};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use geo::MultiPolygon;
use std::fs;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Expected headers in the master tract table.
const COL_GEOID: &str = "GEOID";
const COL_REGION: &str = "Region";
const COL_PARISH: &str = "Parish";
const COL_ELIGIBILITY: &str = "Eligibility";
const COL_POVERTY: &str = "Poverty Rate";
const COL_INCOME: &str = "Median Household Income";
const COL_UNEMPLOYMENT: &str = "Unemployment Rate";
const COL_POPULATION: &str = "Population";
const COL_LABOR_FORCE: &str = "Labor Force";
const COL_BROADBAND: &str = "Broadband Access";
const COL_METRO: &str = "Metro Status";
const COL_PROGRAM: &str = "Program Status";

/// Expected headers in the anchors table.
const COL_ANCHOR_NAME: &str = "Name";
const COL_ANCHOR_CATEGORY: &str = "Category";
const COL_ANCHOR_LON: &str = "Longitude";
const COL_ANCHOR_LAT: &str = "Latitude";
const COL_ANCHOR_LINK: &str = "Link";

/// Property keys that may carry the tract id in the boundary GeoJSON.
const GEOID_PROPERTY_KEYS: [&str; 2] = ["GEOID", "geoid10"];


pub fn load_data(config: &AppConfig) -> Result<DataBundle> {
    println!("Loading data...");

    let tracts = load_tract_table(&config.input.tracts_csv)?;
    println!("Loaded {} tract records", tracts.len());

    let anchors = load_anchor_table(&config.input.anchors_csv)?;
    println!("Loaded {} anchor sites", anchors.len());

    let boundaries = load_boundaries(&config.input.boundaries)?;
    println!("Loaded {} boundary features", boundaries.len());

    let centroids = centroid::centroid_lookup(&boundaries);
    println!("Computed {} tract centroids", centroids.len());

    Ok(DataBundle {
        tracts,
        anchors,
        boundaries,
        centroids,
    })
}

/// Normalize a raw tract identifier: drop any fractional part (ids often
/// arrive as "22033070100.0" after spreadsheet round-trips), then zero-pad
/// to 11 digits. Returns None for empty or non-numeric input.
pub fn normalize_geoid(raw: &str) -> Option<String> {
    let integral = raw.trim().split('.').next().unwrap_or("");
    if integral.is_empty() || !integral.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>11}", integral))
}

/// Case- and whitespace-insensitive mapping of the eligibility source value.
/// Anything outside the accepted set, including blank, is Ineligible.
pub fn eligibility_from(raw: &str) -> Eligibility {
    match raw.trim().to_lowercase().as_str() {
        "eligible" | "yes" | "1" => Eligibility::Eligible,
        _ => Eligibility::Ineligible,
    }
}

/// Total numeric coercion: tolerates blanks, "N/A", currency and percent
/// formatting. Anything that still fails to parse defaults to 0.0; the
/// source data is full of gaps and we deliberately treat them as zero
/// rather than failing the load.
pub fn safe_float(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty()
        || cleaned.eq_ignore_ascii_case("n/a")
        || cleaned.eq_ignore_ascii_case("na")
        || cleaned == "-"
    {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            tracing::debug!(value = raw, "numeric coercion failed, defaulting to 0");
            0.0
        }
    }
}

pub fn safe_int(raw: &str) -> i64 {
    safe_float(raw).trunc() as i64
}

/// Decode a table trying encodings in order; the first clean decode wins.
/// WINDOWS_1252 never reports errors, so a byte stream only becomes fatal
/// if the CSV layer rejects the decoded text.
fn read_text_with_fallback(path: &Path) -> Result<String> {
    let candidates: [&Encoding; 2] = [UTF_8, WINDOWS_1252];
    let bytes = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    for encoding in candidates {
        let (text, _, had_errors) = encoding.decode(&bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }
    Err(anyhow!(
        "File {:?} could not be decoded with any supported encoding",
        path
    ))
}

fn load_tract_table(path: &Path) -> Result<Vec<TractRecord>> {
    let text = read_text_with_fallback(path)?;
    let mut rdr = ReaderBuilder::new().from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", name, path))
    };

    let geoid_idx = col(COL_GEOID)?;
    let region_idx = col(COL_REGION)?;
    let parish_idx = col(COL_PARISH)?;
    let eligibility_idx = col(COL_ELIGIBILITY)?;
    let poverty_idx = col(COL_POVERTY)?;
    let income_idx = col(COL_INCOME)?;
    let unemployment_idx = col(COL_UNEMPLOYMENT)?;
    let population_idx = col(COL_POPULATION)?;
    let labor_force_idx = col(COL_LABOR_FORCE)?;
    let broadband_idx = col(COL_BROADBAND)?;
    let metro_idx = col(COL_METRO)?;
    let program_idx = col(COL_PROGRAM)?;

    let mut tracts = Vec::new();

    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let geoid = match normalize_geoid(field(geoid_idx)) {
            Some(id) => id,
            None => {
                tracing::warn!(raw = field(geoid_idx), "skipping tract row with bad identifier");
                continue;
            }
        };

        tracts.push(TractRecord {
            geoid,
            region: field(region_idx).trim().to_string(),
            parish: field(parish_idx).trim().to_string(),
            eligibility: eligibility_from(field(eligibility_idx)),
            poverty_rate: safe_float(field(poverty_idx)),
            median_income: safe_float(field(income_idx)),
            unemployment_rate: safe_float(field(unemployment_idx)),
            population: safe_int(field(population_idx)),
            labor_force: safe_int(field(labor_force_idx)),
            broadband_pct: safe_float(field(broadband_idx)),
            metro_status: field(metro_idx).trim().to_string(),
            program_status: field(program_idx).trim().to_string(),
        });
    }

    Ok(tracts)
}

fn load_anchor_table(path: &Path) -> Result<Vec<Anchor>> {
    let text = read_text_with_fallback(path)?;
    let mut rdr = ReaderBuilder::new().from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", name, path))
    };

    let name_idx = col(COL_ANCHOR_NAME)?;
    let category_idx = col(COL_ANCHOR_CATEGORY)?;
    let lon_idx = col(COL_ANCHOR_LON)?;
    let lat_idx = col(COL_ANCHOR_LAT)?;
    // Link column is optional.
    let link_idx = headers.iter().position(|h| h == COL_ANCHOR_LINK);

    let mut anchors = Vec::new();

    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let (lon, lat) = match (
            field(lon_idx).trim().parse::<f64>(),
            field(lat_idx).trim().parse::<f64>(),
        ) {
            (Ok(lon), Ok(lat)) => (lon, lat),
            _ => {
                tracing::warn!(name = field(name_idx), "skipping anchor with bad coordinates");
                continue;
            }
        };

        let link = link_idx
            .map(|idx| field(idx).trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        anchors.push(Anchor {
            name: field(name_idx).trim().to_string(),
            category: field(category_idx).trim().to_string(),
            longitude: lon,
            latitude: lat,
            link,
        });
    }

    Ok(anchors)
}

fn load_boundaries(path: &Path) -> Result<Vec<BoundaryFeature>> {
    use std::io::BufReader;
    use geojson::GeoJson;

    println!("Loading boundaries from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open boundary file: {:?}", path))?;
    let reader = BufReader::new(file);

    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse boundary GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        // The tract id lives under one of two property keys depending on
        // which vintage of the boundary file is in use.
        let id_val = feature.properties.as_ref().and_then(|props| {
            GEOID_PROPERTY_KEYS.iter().find_map(|key| props.get(*key))
        });

        let raw_id = match id_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // Skip if no id or not string/number
        };

        let geoid = match normalize_geoid(&raw_id) {
            Some(id) => id,
            None => continue,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let converted: std::result::Result<geo::Geometry<f64>, _> =
                    geom.value.try_into();
                match converted {
                    Ok(geo::Geometry::MultiPolygon(mp)) => mp,
                    Ok(geo::Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
                    Ok(_) => continue, // Skip points/lines
                    Err(e) => {
                        tracing::debug!(geoid = %geoid, error = ?e, "skipping unconvertible geometry");
                        continue;
                    }
                }
            }
            None => continue,
        };

        features.push(BoundaryFeature { geoid, geometry });
    }

    Ok(features)
}

/// TTL-memoized wrapper around [`load_data`]. The load is deterministic and
/// dominated by file I/O, so callers in the request path share one bundle
/// and only pay for a reload once the window lapses.
pub struct CachedLoader {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Arc<DataBundle>)>>,
}

impl CachedLoader {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_load(&self, config: &AppConfig) -> Result<Arc<DataBundle>> {
        let mut slot = self.slot.lock().unwrap();
        if let Some((stamp, bundle)) = slot.as_ref() {
            if stamp.elapsed() < self.ttl {
                return Ok(Arc::clone(bundle));
            }
        }
        let bundle = Arc::new(load_data(config)?);
        *slot = Some((Instant::now(), Arc::clone(&bundle)));
        Ok(bundle)
    }
}
