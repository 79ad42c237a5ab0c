//! Georeferenced orthomosaic input

use crate::{GridError, GridResult};
use image::{GrayImage, Luma, RgbImage};
use vineyard_core::{AffineTransform, GeoCoord, PixelPoint};

/// RGB bands, validity mask and pixel → GPS transform of one survey flight
#[derive(Debug, Clone)]
pub struct Orthomosaic {
    bands: RgbImage,
    mask: GrayImage,
    transform: AffineTransform,
}

impl Orthomosaic {
    /// Fails with [`GridError::ShapeMismatch`] when bands and mask disagree
    pub fn new(bands: RgbImage, mask: GrayImage, transform: AffineTransform) -> GridResult<Self> {
        if bands.dimensions() != mask.dimensions() {
            return Err(GridError::shape_mismatch(format!(
                "bands are {:?} but mask is {:?}",
                bands.dimensions(),
                mask.dimensions()
            )));
        }
        Ok(Self {
            bands,
            mask,
            transform,
        })
    }

    /// Orthomosaic whose validity mask is every pixel with a non-black band value
    pub fn from_bands(bands: RgbImage, transform: AffineTransform) -> Self {
        let mask = GrayImage::from_fn(bands.width(), bands.height(), |x, y| {
            let p = bands.get_pixel(x, y);
            if p.0.iter().any(|&v| v > 0) { Luma([255]) } else { Luma([0]) }
        });
        Self {
            bands,
            mask,
            transform,
        }
    }

    pub fn bands(&self) -> &RgbImage {
        &self.bands
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn pixel_to_gps(&self, point: &PixelPoint) -> GeoCoord {
        self.transform.point_to_gps(point)
    }

    /// Per-pixel GPS table, row-major: entry `i` is pixel `(i % width, i / width)`
    pub fn coordinate_table(&self) -> Vec<GeoCoord> {
        let (width, height) = self.dimensions();
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| self.transform.pixel_to_gps(x as f64, y as f64))
            .collect()
    }
}
