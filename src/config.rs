use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub map: MapConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// GeoJSON FeatureCollection of tract boundaries.
    pub boundaries: PathBuf,
    /// Master tract table (economic/demographic columns).
    pub tracts_csv: PathBuf,
    /// Anchor sites (points of interest).
    pub anchors_csv: PathBuf,
    /// Analyst credentials; when absent, every login is rejected.
    pub users_csv: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// How long a loaded dataset stays fresh before the next request reloads it.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    /// (lon, lat) fallback when no boundary vertices match a viewport request.
    #[serde(default = "default_center")]
    pub default_center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,
    /// Zoom used when a single active tract is framed.
    #[serde(default = "default_focus_zoom")]
    pub focus_zoom: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Optional directory of dashboard assets to serve at "/".
    pub static_dir: Option<PathBuf>,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

// Geographic center of Louisiana.
fn default_center() -> [f64; 2] {
    [-91.9623, 30.9843]
}

fn default_zoom() -> f64 {
    7.0
}

fn default_focus_zoom() -> f64 {
    11.0
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            default_zoom: default_zoom(),
            focus_zoom: default_focus_zoom(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let raw = r#"
            [input]
            boundaries = "data/tracts.geojson"
            tracts_csv = "data/tract_master.csv"
            anchors_csv = "data/anchors.csv"

            [server]
            port = 8080
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.data.cache_ttl_secs, 3600);
        assert_eq!(config.map.default_center, [-91.9623, 30.9843]);
        assert!(config.map.focus_zoom > config.map.default_zoom);
        assert!(config.input.users_csv.is_none());
    }

    #[test]
    fn map_overrides_are_honored() {
        let raw = r#"
            [input]
            boundaries = "b.geojson"
            tracts_csv = "t.csv"
            anchors_csv = "a.csv"

            [map]
            default_zoom = 6.5
            focus_zoom = 12.0

            [server]
            port = 3000
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.map.default_zoom, 6.5);
        assert_eq!(config.map.focus_zoom, 12.0);
    }
}
