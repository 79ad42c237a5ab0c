//! Configuration for the plant locator

use crate::{LocatorError, LocatorResult};
use serde::{Deserialize, Serialize};

/// Configuration for the plant locator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Flight heading in image space, degrees (+x right, +y down)
    pub heading_deg: f64,
    /// Parcels whose centroid is this close to the drone pixel are rejected
    pub min_drone_distance_px: f64,
    /// Which claimant keeps a contested parcel
    pub distance_metric: DistanceMetric,
    /// Row intersection strategy
    pub strategy: StrategyKind,
    /// Raster strategy settings
    pub raster: RasterStrategyConfig,
    /// Detector post-processing settings
    pub detector: DetectorConfig,
    /// Frame-spacing settings
    pub tracker: SpacingConfig,
}

/// Distance used to arbitrate between observations claiming the same parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Ray/row crossing → parcel centroid
    #[default]
    MatchDistance,
    /// Drone pixel → ray/row crossing
    RayDistance,
}

/// Row intersection strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Analytic,
    Raster,
}

/// Raster intersection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterStrategyConfig {
    /// Length of the rasterized heading ray
    pub ray_length_px: f64,
    /// Thickness of the rasterized row lines
    pub row_thickness: u32,
    /// Thickness of the rasterized heading ray
    pub ray_thickness: u32,
}

impl Default for RasterStrategyConfig {
    fn default() -> Self {
        Self {
            ray_length_px: 3000.0,
            row_thickness: 9,
            ray_thickness: 1,
        }
    }
}

/// Detector output post-processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Detections at or below this confidence are dropped
    pub score_threshold: f64,
    /// Overlap above which the weaker box is suppressed
    pub iou_threshold: f64,
    /// Override band half-width is `frame width / center_band_divisor`
    pub center_band_divisor: u32,
    /// Minimum confidence for a detection inside the band to override
    pub override_confidence: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.15,
            iou_threshold: 0.6,
            center_band_divisor: 6,
            override_confidence: 0.6,
        }
    }
}

/// Frame-spacing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    /// Minimum travelled distance between accepted frames, meters
    pub min_spacing_m: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            heading_deg: -98.3,
            min_drone_distance_px: 20.0,
            distance_metric: DistanceMetric::default(),
            strategy: StrategyKind::default(),
            raster: RasterStrategyConfig::default(),
            detector: DetectorConfig::default(),
            tracker: SpacingConfig::default(),
        }
    }
}

impl LocatorConfig {
    /// Heading in radians
    pub fn heading(&self) -> f64 {
        self.heading_deg.to_radians()
    }

    /// Config that validates analytic results against the raster strategy
    pub fn raster_validation() -> Self {
        Self {
            strategy: StrategyKind::Raster,
            ..Default::default()
        }
    }

    /// Config that keeps the claimant flying closest to its row
    pub fn nearest_drone() -> Self {
        Self {
            distance_metric: DistanceMetric::RayDistance,
            ..Default::default()
        }
    }

    /// Config that drops frames closer than `min_spacing_m` to the last accepted one
    pub fn with_min_spacing(min_spacing_m: f64) -> Self {
        Self {
            tracker: SpacingConfig { min_spacing_m },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> LocatorResult<()> {
        if !self.heading_deg.is_finite() {
            return Err(LocatorError::configuration("heading_deg must be finite"));
        }
        if !(self.min_drone_distance_px.is_finite() && self.min_drone_distance_px >= 0.0) {
            return Err(LocatorError::configuration("min_drone_distance_px must be >= 0"));
        }
        if !(self.raster.ray_length_px.is_finite() && self.raster.ray_length_px > 0.0) {
            return Err(LocatorError::configuration("ray_length_px must be positive"));
        }
        if self.raster.row_thickness == 0 || self.raster.ray_thickness == 0 {
            return Err(LocatorError::configuration("raster thickness must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(LocatorError::configuration("iou_threshold must lie in [0, 1]"));
        }
        if self.detector.center_band_divisor == 0 {
            return Err(LocatorError::configuration("center_band_divisor must be positive"));
        }
        if !(self.tracker.min_spacing_m.is_finite() && self.tracker.min_spacing_m >= 0.0) {
            return Err(LocatorError::configuration("min_spacing_m must be >= 0"));
        }
        Ok(())
    }
}
