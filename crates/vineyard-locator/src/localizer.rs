//! Per-observation localization.
//!
//! Each observation resolves its drone pixel, casts the heading ray against the
//! row lines and proposes the parcel nearest the crossing. Anything that
//! stops an observation short ends in [`Localization::Unassigned`].

use crate::CoordinateMapper;
use crate::config::RasterStrategyConfig;
use image::GrayImage;
use std::ops::ControlFlow;
use tracing::trace;
use vineyard_core::{
    Candidate, ImplicitLine, Localization, Observation, PixelPoint, Ray, UnresolvedObservation,
};
use vineyard_grid::ParcelGrid;
use vineyard_grid::raster::{and_mask, draw_line, for_each_line_pixel};

/// Where a heading ray first meets a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowHit {
    pub point: PixelPoint,
    pub row_index: Option<usize>,
    /// Drone pixel → hit point
    pub distance: f64,
}

/// Finds the first row a heading ray crosses
pub trait RowIntersectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn intersect(&self, ray: &Ray) -> Option<RowHit>;
}

// ============================================================================
// ANALYTIC STRATEGY
// ============================================================================

/// Closed-form ray/line intersection against every row
pub struct AnalyticIntersection {
    lines: Vec<(usize, ImplicitLine)>,
}

impl AnalyticIntersection {
    pub fn new(grid: &ParcelGrid) -> Self {
        Self {
            lines: grid.rows().iter().map(|r| (r.index, r.line())).collect(),
        }
    }
}

impl RowIntersectionStrategy for AnalyticIntersection {
    fn name(&self) -> &'static str {
        "analytic"
    }

    fn intersect(&self, ray: &Ray) -> Option<RowHit> {
        let mut best: Option<(usize, f64)> = None;
        for (row_index, line) in &self.lines {
            let Some(t) = ray.intersect(line) else {
                continue;
            };
            if !t.is_finite() || t < 0.0 {
                continue;
            }
            if best.is_none_or(|(_, b)| t < b) {
                best = Some((*row_index, t));
            }
        }

        best.map(|(row_index, t)| RowHit {
            point: ray.point_at(t),
            row_index: Some(row_index),
            distance: t * ray.direction.norm(),
        })
    }
}

// ============================================================================
// RASTER STRATEGY
// ============================================================================

/// Pixel-overlap intersection between a rasterized ray and the masked rows
pub struct RasterIntersection {
    rows: GrayImage,
    config: RasterStrategyConfig,
}

impl RasterIntersection {
    /// Rasterize the grid rows once, clipped to the smoothed mask
    pub fn new(grid: &ParcelGrid, smoothed_mask: &GrayImage, config: RasterStrategyConfig) -> Self {
        let (width, height) = smoothed_mask.dimensions();
        let mut lines = GrayImage::new(width, height);
        for row in grid.rows() {
            draw_line(&mut lines, row.start, row.end, config.row_thickness, 255);
        }
        Self {
            rows: and_mask(&lines, smoothed_mask),
            config,
        }
    }
}

impl RowIntersectionStrategy for RasterIntersection {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn intersect(&self, ray: &Ray) -> Option<RowHit> {
        let (width, height) = self.rows.dimensions();
        let end = ray.point_at(self.config.ray_length_px);
        let mut best: Option<(PixelPoint, f64)> = None;

        let _ = for_each_line_pixel(ray.origin, end, self.config.ray_thickness, width, height, |x, y| {
            if self.rows.get_pixel(x, y)[0] > 0 {
                let p = PixelPoint::from((x, y));
                let d = p.distance_to(&ray.origin);
                if best.is_none_or(|(_, b)| d < b) {
                    best = Some((p, d));
                }
            }
            ControlFlow::Continue(())
        });

        best.map(|(point, distance)| RowHit {
            point,
            row_index: None,
            distance,
        })
    }
}

// ============================================================================
// LOCALIZER
// ============================================================================

/// Read-only view over the grid, index and strategy shared by all observations
pub struct ObservationLocalizer<'a> {
    grid: &'a ParcelGrid,
    mapper: &'a CoordinateMapper,
    strategy: &'a dyn RowIntersectionStrategy,
    heading: f64,
    min_drone_distance_px: f64,
}

impl<'a> ObservationLocalizer<'a> {
    pub fn new(
        grid: &'a ParcelGrid,
        mapper: &'a CoordinateMapper,
        strategy: &'a dyn RowIntersectionStrategy,
        heading: f64,
        min_drone_distance_px: f64,
    ) -> Self {
        Self {
            grid,
            mapper,
            strategy,
            heading,
            min_drone_distance_px,
        }
    }

    pub fn localize(&self, observation: &Observation) -> Localization {
        match self.try_localize(observation) {
            Ok(candidate) => Localization::Located(candidate),
            Err(reason) => {
                trace!(id = %observation.id, %reason, "Observation unassigned");
                Localization::Unassigned(reason)
            }
        }
    }

    fn try_localize(&self, observation: &Observation) -> Result<Candidate, UnresolvedObservation> {
        if observation.detector_failed {
            return Err(UnresolvedObservation::DetectorFailed);
        }
        if observation.redundant {
            return Err(UnresolvedObservation::RedundantFrame);
        }
        if observation.detections.is_empty() {
            return Err(UnresolvedObservation::NoDetections);
        }

        let gps = observation.gps.ok_or(UnresolvedObservation::MissingGps)?;
        let drone_pixel = self
            .mapper
            .gps_to_pixel(&gps)
            .map_err(|_| UnresolvedObservation::MissingGps)?;

        let ray = Ray::from_heading(drone_pixel, self.heading);
        let hit = self
            .strategy
            .intersect(&ray)
            .ok_or(UnresolvedObservation::NoRowIntersection)?;

        let (parcel, match_distance) = self
            .grid
            .nearest_parcel(&hit.point)
            .ok_or(UnresolvedObservation::NoRowIntersection)?;

        if parcel.centroid.distance_to(&drone_pixel) <= self.min_drone_distance_px {
            return Err(UnresolvedObservation::ImplausibleParcel);
        }

        Ok(Candidate {
            parcel_index: parcel.index,
            row_index: hit.row_index,
            drone_pixel,
            intersection: hit.point,
            ray_distance: hit.distance,
            match_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use vineyard_core::{AffineTransform, Detection, GeoCoord, Parcel, RowSegment, polygon_centroid};

    fn vertical_row(index: usize, x: f64) -> RowSegment {
        RowSegment::new(index, index as i32, PixelPoint::new(x, -500.0), PixelPoint::new(x, 500.0))
    }

    fn square(index: usize, row_index: usize, cx: f64, cy: f64) -> Parcel {
        let corners = [
            PixelPoint::new(cx - 2.0, cy - 2.0),
            PixelPoint::new(cx - 2.0, cy + 2.0),
            PixelPoint::new(cx + 2.0, cy + 2.0),
            PixelPoint::new(cx + 2.0, cy - 2.0),
        ];
        Parcel {
            index,
            row_index,
            sequence: 0,
            corners,
            centroid: polygon_centroid(&corners, 1e-9).unwrap(),
        }
    }

    fn grid() -> ParcelGrid {
        let rows = vec![vertical_row(0, 10.0), vertical_row(1, 30.0), vertical_row(2, -20.0)];
        let parcels = vec![square(0, 0, 10.0, 0.0), square(1, 1, 30.0, 0.0), square(2, 0, 10.0, 40.0)];
        ParcelGrid::from_parts(rows, Vec::new(), parcels)
    }

    fn mapper() -> (CoordinateMapper, AffineTransform) {
        let transform = AffineTransform::north_up(2.0, 41.0, 1e-6, 1e-6);
        let table = crate::mapper::CoordinateTable::from_transform(&transform, 64, 64);
        (CoordinateMapper::from_table(&table).unwrap(), transform)
    }

    fn observation(gps: Option<GeoCoord>) -> Observation {
        Observation::new("f", gps).with_detections(vec![Detection::new([0.0, 0.0, 4.0, 4.0], 0.9)])
    }

    #[test]
    fn test_analytic_hit_nearest_row_ahead() {
        let strategy = AnalyticIntersection::new(&grid());
        let hit = strategy.intersect(&Ray::from_heading(PixelPoint::ORIGIN, 0.0)).unwrap();
        assert_eq!(hit.row_index, Some(0));
        assert!((hit.point.x - 10.0).abs() < 1e-12);
        assert!(hit.point.y.abs() < 1e-12);
        assert!((hit.distance - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_analytic_behind_and_parallel() {
        let strategy = AnalyticIntersection::new(&grid());
        let backwards = strategy.intersect(&Ray::from_heading(PixelPoint::new(40.0, 0.0), 0.0));
        assert!(backwards.is_none());
        let parallel = strategy.intersect(&Ray::from_heading(PixelPoint::ORIGIN, std::f64::consts::FRAC_PI_2));
        assert!(parallel.is_none());
    }

    #[test]
    fn test_raster_hit_nearest_pixel() {
        let grid = grid();
        let mask = GrayImage::from_pixel(64, 64, Luma([255]));
        let strategy = RasterIntersection::new(&grid, &mask, RasterStrategyConfig::default());

        let hit = strategy.intersect(&Ray::from_heading(PixelPoint::new(0.0, 20.0), 0.0)).unwrap();
        assert_eq!(hit.row_index, None);
        assert_eq!(hit.point, PixelPoint::new(6.0, 20.0));

        let miss = strategy.intersect(&Ray::from_heading(PixelPoint::new(0.0, 20.0), std::f64::consts::PI));
        assert!(miss.is_none());
    }

    #[test]
    fn test_localize_selects_parcel() {
        let grid = grid();
        let (mapper, transform) = mapper();
        let strategy = AnalyticIntersection::new(&grid);
        let localizer = ObservationLocalizer::new(&grid, &mapper, &strategy, 0.0, 5.0);

        let gps = transform.pixel_to_gps(0.0, 3.0);
        let candidate = *localizer.localize(&observation(Some(gps))).candidate().unwrap();
        assert_eq!(candidate.parcel_index, 0);
        assert_eq!(candidate.drone_pixel, PixelPoint::new(0.0, 3.0));
        assert!((candidate.ray_distance - 10.0).abs() < 1e-9);
        assert!((candidate.match_distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_localize_unresolved_reasons() {
        let grid = grid();
        let (mapper, transform) = mapper();
        let strategy = AnalyticIntersection::new(&grid);
        let localizer = ObservationLocalizer::new(&grid, &mapper, &strategy, 0.0, 20.0);

        let gps = transform.pixel_to_gps(0.0, 0.0);
        assert_eq!(
            localizer.localize(&observation(None)),
            Localization::Unassigned(UnresolvedObservation::MissingGps)
        );
        assert_eq!(
            localizer.localize(&Observation::new("empty", Some(gps))),
            Localization::Unassigned(UnresolvedObservation::NoDetections)
        );
        assert_eq!(
            localizer.localize(&observation(Some(gps)).mark_redundant().mark_detector_failed()),
            Localization::Unassigned(UnresolvedObservation::DetectorFailed)
        );
        assert_eq!(
            localizer.localize(&observation(Some(gps)).mark_redundant()),
            Localization::Unassigned(UnresolvedObservation::RedundantFrame)
        );
        // parcel 0 centroid sits 10 px from the drone
        assert_eq!(
            localizer.localize(&observation(Some(gps))),
            Localization::Unassigned(UnresolvedObservation::ImplausibleParcel)
        );

        let past_rows = transform.pixel_to_gps(50.0, 0.0);
        assert_eq!(
            localizer.localize(&observation(Some(past_rows))),
            Localization::Unassigned(UnresolvedObservation::NoRowIntersection)
        );
    }
}
