//! Validity mask smoothing

use crate::config::MaskConfig;
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};
use tracing::debug;

/// Removes speckle and pulls the valid area away from the orthomosaic border
pub struct MaskProcessor {
    config: MaskConfig,
}

impl MaskProcessor {
    pub fn new(config: MaskConfig) -> Self {
        Self { config }
    }

    /// Opening, erosion, then Gaussian blur. An empty raster comes back unchanged.
    pub fn smooth(&self, mask: &GrayImage) -> GrayImage {
        if mask.width() == 0 || mask.height() == 0 {
            return mask.clone();
        }

        let mut smoothed = if self.config.open_radius > 0 {
            morphology::open(mask, Norm::LInf, self.config.open_radius)
        } else {
            mask.clone()
        };

        if self.config.erode_radius > 0 {
            smoothed = morphology::erode(&smoothed, Norm::LInf, self.config.erode_radius);
        }

        if self.config.blur_sigma > 0.0 {
            smoothed = filter::gaussian_blur_f32(&smoothed, self.config.blur_sigma);
        }

        debug!(
            width = mask.width(),
            height = mask.height(),
            valid_pixels = smoothed.pixels().filter(|p| p[0] > 0).count(),
            "Smoothed validity mask"
        );

        smoothed
    }
}

impl Default for MaskProcessor {
    fn default() -> Self {
        Self::new(MaskConfig::default())
    }
}
