//! # Vineyard Grid - Parcel Grid Construction
//!
//! Builds the static parcel grid from a georeferenced orthomosaic.
//! Features:
//! - Validity mask smoothing (opening, erosion, Gaussian blur)
//! - Parallel row line search bounded by the mask
//! - Row contour extraction and oriented rectangles
//! - Fixed-length parcel partition with exact centroids
//! - JSON persistence of the built grid
//!
//! ## Pipeline
//!
//! 1. Smooth the validity mask
//! 2. Step row lines perpendicular to a seed row until they leave the mask
//! 3. Rasterize the rows, cut each row blob into parcels
//! 4. Hand the immutable [`ParcelGrid`] to the locator

pub mod config;
pub mod error;
pub mod mask;
pub mod ortho;
pub mod parcels;
pub mod persist;
pub mod raster;
pub mod rows;

pub use config::{GridConfig, MaskConfig, ParcelConfig, RowSearchConfig, SeedRow};
pub use error::{GridError, GridResult};
pub use mask::MaskProcessor;
pub use ortho::Orthomosaic;
pub use parcels::{GridStats, ParcelGrid, ParcelGridBuilder};
pub use persist::GridState;
pub use rows::RowLineGenerator;

use image::GrayImage;
use std::time::Instant;
use tracing::info;
use vineyard_core::RowSegment;

/// Main grid engine that runs mask smoothing, row search and partition
pub struct GridEngine {
    config: GridConfig,
    mask_processor: MaskProcessor,
}

impl GridEngine {
    /// Create a grid engine, rejecting invalid calibration up front
    pub fn with_config(config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        info!(
            row_separation = config.row_separation,
            parcel_length = config.parcel_length,
            "🍇 Initializing grid engine"
        );
        let mask_processor = MaskProcessor::new(config.mask.clone());
        Ok(Self {
            config,
            mask_processor,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn smooth_mask(&self, mask: &GrayImage) -> GrayImage {
        self.mask_processor.smooth(mask)
    }

    /// Row lines over an already smoothed mask
    pub fn generate_rows(&self, smoothed: &GrayImage) -> GridResult<Vec<RowSegment>> {
        RowLineGenerator::new(smoothed, &self.config.rows).generate(&self.config.seed, self.config.row_separation)
    }

    /// Parcels over an already smoothed mask
    pub fn build_parcels(&self, smoothed: &GrayImage, rows: &[RowSegment]) -> GridResult<ParcelGrid> {
        ParcelGridBuilder::new(&self.config.parcels, self.config.parcel_length).build(smoothed, rows)
    }

    /// Full build: smooth → rows → parcels
    pub fn build(&self, ortho: &Orthomosaic) -> GridResult<ParcelGrid> {
        let started = Instant::now();
        let (width, height) = ortho.dimensions();
        info!(width, height, "Building parcel grid");

        let smoothed = self.smooth_mask(ortho.mask());
        let rows = self.generate_rows(&smoothed)?;
        info!(rows = rows.len(), "Row lines generated");

        let grid = self.build_parcels(&smoothed, &rows)?;
        info!(
            rows = grid.rows().len(),
            parcels = grid.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "✅ Parcel grid ready"
        );
        Ok(grid)
    }

    /// Rebuild a grid from persisted state using this engine's area tolerance
    pub fn restore(&self, state: &GridState) -> GridResult<ParcelGrid> {
        state.to_grid(self.config.parcels.area_epsilon)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};
    use vineyard_core::{AffineTransform, PixelPoint};

    fn striped_ortho() -> Orthomosaic {
        let mask = GrayImage::from_fn(300, 200, |x, y| {
            if (20..280).contains(&x) && (30..170).contains(&y) { Luma([255]) } else { Luma([0]) }
        });
        Orthomosaic::new(
            RgbImage::new(300, 200),
            mask,
            AffineTransform::north_up(2.0, 41.0, 1e-6, 1e-6),
        )
        .unwrap()
    }

    fn config() -> GridConfig {
        let seed = SeedRow::new(PixelPoint::new(100.0, 100.0), PixelPoint::new(200.0, 100.0));
        GridConfig::new(seed, 25.0, 40.0)
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut bad = config();
        bad.row_separation = 0.0;
        assert!(GridEngine::with_config(bad).is_err());
    }

    #[test]
    fn test_full_build() {
        let engine = GridEngine::with_config(config()).unwrap();
        let grid = engine.build(&striped_ortho()).unwrap();

        assert!(grid.rows().len() >= 3);
        assert!(!grid.is_empty());
        assert_eq!(grid.rows()[0].offset, 0);

        let mut rows_seen: Vec<usize> = grid.parcels().iter().map(|p| p.row_index).collect();
        assert!(rows_seen.windows(2).all(|w| w[0] <= w[1]));
        rows_seen.dedup();
        assert!(rows_seen.len() >= 2);
    }

    #[test]
    fn test_build_on_empty_ortho() {
        let engine = GridEngine::with_config(config()).unwrap();
        let empty = Orthomosaic::new(
            RgbImage::new(0, 0),
            GrayImage::new(0, 0),
            AffineTransform::north_up(0.0, 0.0, 1.0, 1.0),
        )
        .unwrap();
        let grid = engine.build(&empty).unwrap();
        assert!(grid.rows().is_empty());
        assert!(grid.is_empty());
    }

    #[test]
    fn test_restore_from_state() {
        let engine = GridEngine::with_config(config()).unwrap();
        let grid = engine.build(&striped_ortho()).unwrap();
        let restored = engine.restore(&GridState::from_grid(&grid)).unwrap();
        assert_eq!(restored.len(), grid.len());
        assert_eq!(restored.parcels()[0].centroid, grid.parcels()[0].centroid);
    }
}
