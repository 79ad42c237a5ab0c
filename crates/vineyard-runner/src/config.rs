//! Runner configuration
//!
//! Layered with the `config` crate: an optional `vineyard.toml` (or the file
//! passed on the command line), then `VINEYARD__SECTION__KEY` environment
//! variables. `VINEYARD_SEP` and `PARCEL_LEN` override the grid calibration.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use vineyard_core::AffineTransform;
use vineyard_grid::GridConfig;
use vineyard_locator::LocatorConfig;

/// Batch runner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Pixel → GPS transform of the orthomosaic
    pub transform: AffineTransform,
    /// Grid calibration; seed, row separation and parcel length have no defaults
    pub grid: GridConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

/// Input files
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Validity mask image; derived from the bands when absent
    pub mask: Option<PathBuf>,
    /// RGB orthomosaic bands
    pub bands: Option<PathBuf>,
    /// Per-pixel GPS table; generated from `transform` when absent
    pub coordinate_table: Option<PathBuf>,
    /// Frame records with materialized detector output
    pub frames: Option<PathBuf>,
    /// Previously saved grid; skips the grid build
    pub grid_state: Option<PathBuf>,
}

/// Output files, relative to `dir`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub parcels_csv: String,
    pub parcels_json: String,
    pub report_json: String,
    pub grid_state: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            parcels_csv: "parcels.csv".to_string(),
            parcels_json: "parcels.json".to_string(),
            report_json: "assignments.json".to_string(),
            grid_state: Some("grid_state.json".to_string()),
        }
    }
}

impl OutputConfig {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl RunnerConfig {
    /// Load configuration from `path` (or `./vineyard.toml` when present) and the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("vineyard").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("VINEYARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("grid.row_separation", std::env::var("VINEYARD_SEP").ok())?
            .set_override_option("grid.parcel_length", std::env::var("PARCEL_LEN").ok())?
            .build()
            .context("failed to read runner configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("invalid runner configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input.mask.is_none() && self.input.bands.is_none() {
            bail!("either input.mask or input.bands must be set");
        }
        if self.transform.determinant() == 0.0 {
            bail!("transform is singular");
        }
        self.grid.validate()?;
        self.locator.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"
[input]
mask = "mask.png"
frames = "frames.json"

[transform]
a = 2e-6
b = 0.0
c = 2.1734
d = 0.0
e = -2e-6
f = 41.3851

[grid]
row_separation = 25.0
parcel_length = 40.0
seed = { start = [100.0, 100.0], end = [200.0, 100.0] }
"#;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vineyard.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_with_defaults() {
        let (_dir, path) = write(BASE);
        let config = RunnerConfig::load(Some(&path)).unwrap();

        assert_eq!(config.grid.parcel_length, 40.0);
        assert_eq!(config.grid.seed.end.x, 200.0);
        assert_eq!(config.grid.mask.erode_radius, 10);
        assert_eq!(config.locator.heading_deg, -98.3);
        assert_eq!(config.output.path("parcels.csv"), PathBuf::from("output/parcels.csv"));
        assert!(config.input.coordinate_table.is_none());
    }

    #[test]
    fn test_partial_locator_section() {
        let (_dir, path) = write(&format!("{BASE}\n[locator]\nheading_deg = 90.0\n\n[locator.tracker]\nmin_spacing_m = 0.5\n"));
        let config = RunnerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.locator.heading_deg, 90.0);
        assert_eq!(config.locator.tracker.min_spacing_m, 0.5);
        assert_eq!(config.locator.min_drone_distance_px, 20.0);
    }

    #[test]
    fn test_missing_calibration_is_rejected() {
        let (_dir, path) = write(&BASE.replace("parcel_length = 40.0\n", ""));
        assert!(RunnerConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_inputs_are_rejected() {
        let (_dir, path) = write(&BASE.replace("mask = \"mask.png\"\n", ""));
        assert!(RunnerConfig::load(Some(&path)).is_err());
    }
}
