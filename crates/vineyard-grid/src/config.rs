//! Configuration for grid construction

use crate::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use vineyard_core::PixelPoint;

/// Smallest accepted distance between adjacent rows, in pixels
pub const MIN_ROW_SEPARATION: f64 = 1.0;

/// Configuration for the grid engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Hand-picked segment lying on one vineyard row
    pub seed: SeedRow,
    /// Perpendicular pixel distance between adjacent rows
    pub row_separation: f64,
    /// Along-row pixel length of one parcel
    pub parcel_length: f64,
    /// Mask smoothing settings
    #[serde(default)]
    pub mask: MaskConfig,
    /// Row search settings
    #[serde(default)]
    pub rows: RowSearchConfig,
    /// Parcel partition settings
    #[serde(default)]
    pub parcels: ParcelConfig,
}

/// Two pixel points defining the direction of one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedRow {
    pub start: PixelPoint,
    pub end: PixelPoint,
}

impl SeedRow {
    pub fn new(start: PixelPoint, end: PixelPoint) -> Self {
        Self { start, end }
    }

    /// Unit vector from `start` to `end`
    pub fn direction(&self) -> Option<PixelPoint> {
        (self.end - self.start).normalized()
    }
}

/// Mask smoothing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Chebyshev radius of the opening (3 → 7×7 square)
    pub open_radius: u8,
    /// Chebyshev radius of the erosion (10 → five passes of a 5×5 square)
    pub erode_radius: u8,
    /// Gaussian blur sigma; 0 disables the blur
    pub blur_sigma: f32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            open_radius: 3,
            erode_radius: 10,
            blur_sigma: 1.1,
        }
    }
}

/// Row line search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSearchConfig {
    /// How far each row line is extended past the seed endpoints, in pixels
    pub extension_px: f64,
    /// Thickness of the line used for the visibility test
    pub visibility_thickness: u32,
    /// Cap on evaluated candidates; derived from the raster diagonal when unset
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

impl Default for RowSearchConfig {
    fn default() -> Self {
        Self {
            extension_px: 6000.0,
            visibility_thickness: 2,
            max_iterations: None,
        }
    }
}

/// Parcel partition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelConfig {
    /// Thickness of the rasterized row lines
    pub row_thickness: u32,
    /// Median filter radius applied to the masked rows (2 → 5×5)
    pub median_radius: u32,
    /// Fractional parcel remainder from which the count rounds up
    pub round_up_fraction: f64,
    /// Minimum absolute parcel area
    pub area_epsilon: f64,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            row_thickness: 9,
            median_radius: 2,
            round_up_fraction: 0.4,
            area_epsilon: 1e-6,
        }
    }
}

impl GridConfig {
    pub fn new(seed: SeedRow, row_separation: f64, parcel_length: f64) -> Self {
        Self {
            seed,
            row_separation,
            parcel_length,
            mask: MaskConfig::default(),
            rows: RowSearchConfig::default(),
            parcels: ParcelConfig::default(),
        }
    }

    /// Config for masks that are already clean (no opening, erosion or blur)
    pub fn clean_mask(seed: SeedRow, row_separation: f64, parcel_length: f64) -> Self {
        Self {
            mask: MaskConfig {
                open_radius: 0,
                erode_radius: 0,
                blur_sigma: 0.0,
            },
            ..Self::new(seed, row_separation, parcel_length)
        }
    }

    /// Check calibration inputs before any raster work starts
    pub fn validate(&self) -> GridResult<()> {
        if !self.seed.start.is_finite() || !self.seed.end.is_finite() {
            return Err(GridError::configuration("seed row has non-finite coordinates"));
        }
        if self.seed.direction().is_none() {
            return Err(GridError::configuration("seed row endpoints coincide"));
        }
        if !(self.row_separation.is_finite() && self.row_separation >= MIN_ROW_SEPARATION) {
            return Err(GridError::configuration(format!(
                "row_separation must be at least {MIN_ROW_SEPARATION} px, got {}",
                self.row_separation
            )));
        }
        if !(self.parcel_length.is_finite() && self.parcel_length > 0.0) {
            return Err(GridError::configuration(format!(
                "parcel_length must be positive, got {}",
                self.parcel_length
            )));
        }
        if !(self.mask.blur_sigma.is_finite() && self.mask.blur_sigma >= 0.0) {
            return Err(GridError::configuration("blur_sigma must be >= 0"));
        }
        if !(self.rows.extension_px.is_finite() && self.rows.extension_px >= 0.0) {
            return Err(GridError::configuration("extension_px must be >= 0"));
        }
        if self.rows.max_iterations == Some(0) {
            return Err(GridError::configuration("max_iterations must be at least 1"));
        }
        if self.rows.visibility_thickness == 0 || self.parcels.row_thickness == 0 {
            return Err(GridError::configuration("line thickness must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.parcels.round_up_fraction) {
            return Err(GridError::configuration("round_up_fraction must lie in [0, 1]"));
        }
        if !(self.parcels.area_epsilon.is_finite() && self.parcels.area_epsilon >= 0.0) {
            return Err(GridError::configuration("area_epsilon must be >= 0"));
        }
        Ok(())
    }
}
