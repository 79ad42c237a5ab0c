//! Parallel row line generation.
//!
//! Starting from a seed row, candidate lines are stepped perpendicular to the
//! row direction by the row separation. A candidate is kept while its
//! rasterized line still touches the smoothed mask; the first miss on the
//! positive side flips the search to the negative side, the first miss there
//! ends it.

use crate::config::{RowSearchConfig, SeedRow};
use crate::raster::line_touches_mask;
use crate::{GridError, GridResult};
use image::GrayImage;
use tracing::{debug, trace};
use vineyard_core::{PixelPoint, RowSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Forward,
    Backward,
}

/// Generates every visible row line parallel to a seed row
pub struct RowLineGenerator<'a> {
    mask: &'a GrayImage,
    config: &'a RowSearchConfig,
}

impl<'a> RowLineGenerator<'a> {
    pub fn new(mask: &'a GrayImage, config: &'a RowSearchConfig) -> Self {
        Self { mask, config }
    }

    /// Upper bound on candidates a search may evaluate.
    ///
    /// `config.max_iterations` when set, otherwise enough candidates to sweep
    /// the extended raster diagonal on both sides. Never above `i32::MAX`, so
    /// row offsets cannot overflow.
    pub fn iteration_limit(&self, separation: f64) -> usize {
        let limit = match self.config.max_iterations {
            Some(cap) => cap,
            None => {
                let (w, h) = self.mask.dimensions();
                let diagonal = (w as f64).hypot(h as f64) + 2.0 * self.config.extension_px;
                // float → usize casts saturate
                let steps = (diagonal / separation).ceil() as usize;
                steps.saturating_add(2).saturating_mul(2)
            }
        };
        limit.min(i32::MAX as usize)
    }

    /// Candidate line `k` separations away from the seed
    pub fn candidate(&self, seed: &SeedRow, direction: PixelPoint, separation: f64, k: i32) -> (PixelPoint, PixelPoint) {
        let shift = direction.perpendicular() * (k as f64 * separation);
        let extension = direction * self.config.extension_px;
        (seed.start + shift - extension, seed.end + shift + extension)
    }

    /// Rows in generation order: `k = 0, 1, …` then `k = -1, -2, …`
    pub fn generate(&self, seed: &SeedRow, separation: f64) -> GridResult<Vec<RowSegment>> {
        if self.mask.width() == 0 || self.mask.height() == 0 {
            debug!("Empty mask, no rows generated");
            return Ok(Vec::new());
        }

        let direction = seed
            .direction()
            .ok_or_else(|| GridError::configuration("seed row endpoints coincide"))?;
        if !(separation.is_finite() && separation > 0.0) {
            return Err(GridError::configuration(format!(
                "row separation must be positive, got {separation}"
            )));
        }

        let limit = self.iteration_limit(separation);
        let mut rows = Vec::new();
        let mut phase = Phase::Forward;
        let mut k: i32 = 0;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > limit {
                return Err(GridError::BoundedSearchExceeded { iterations, limit });
            }

            let (start, end) = self.candidate(seed, direction, separation, k);
            let visible = line_touches_mask(self.mask, start, end, self.config.visibility_thickness);
            trace!(k, visible, "Row candidate");

            match (visible, phase) {
                (true, Phase::Forward) => {
                    rows.push(RowSegment::new(rows.len(), k, start, end));
                    k += 1;
                }
                (true, Phase::Backward) => {
                    rows.push(RowSegment::new(rows.len(), k, start, end));
                    k -= 1;
                }
                (false, Phase::Forward) => {
                    phase = Phase::Backward;
                    k = -1;
                }
                (false, Phase::Backward) => break,
            }
        }

        debug!(rows = rows.len(), iterations, "Row search finished");
        Ok(rows)
    }
}

/// Convenience wrapper over [`RowLineGenerator::generate`]
pub fn generate_rows(
    mask: &GrayImage,
    seed: &SeedRow,
    separation: f64,
    config: &RowSearchConfig,
) -> GridResult<Vec<RowSegment>> {
    RowLineGenerator::new(mask, config).generate(seed, separation)
}
