//! Parcel grid construction.
//!
//! Row lines are rasterized, masked and median-filtered into row blobs. Each
//! blob's outer contour gets a minimum-area rectangle whose long side is cut
//! into fixed-length parcels. Blobs are re-ordered by the row line they sit on
//! so parcel numbering follows the row generation order.

use crate::config::ParcelConfig;
use crate::raster::{and_mask, draw_line, for_each_line_pixel};
use crate::{GridError, GridResult};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::filter::median_filter;
use imageproc::geometry::{convex_hull, min_area_rect};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};
use vineyard_core::{Parcel, PixelPoint, RowBand, RowSegment, polygon_centroid};

/// Build counters for one grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    pub rows: usize,
    pub contours: usize,
    pub sliver_contours: usize,
    pub unmatched_contours: usize,
    pub bands: usize,
    pub parcels: usize,
}

/// Rows, row bands and parcels. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ParcelGrid {
    rows: Vec<RowSegment>,
    bands: Vec<RowBand>,
    parcels: Vec<Parcel>,
    stats: GridStats,
}

impl ParcelGrid {
    /// Assemble a grid from already-validated parts
    pub fn from_parts(rows: Vec<RowSegment>, bands: Vec<RowBand>, parcels: Vec<Parcel>) -> Self {
        let stats = GridStats {
            rows: rows.len(),
            bands: bands.len(),
            parcels: parcels.len(),
            ..Default::default()
        };
        Self {
            rows,
            bands,
            parcels,
            stats,
        }
    }

    pub fn rows(&self) -> &[RowSegment] {
        &self.rows
    }

    pub fn bands(&self) -> &[RowBand] {
        &self.bands
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn parcel(&self, index: usize) -> Option<&Parcel> {
        self.parcels.get(index)
    }

    pub fn stats(&self) -> &GridStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    /// Parcels belonging to one row, in sequence order
    pub fn parcels_in_row(&self, row_index: usize) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter().filter(move |p| p.row_index == row_index)
    }

    /// Parcel whose centroid is nearest `point`; the first index wins ties
    pub fn nearest_parcel(&self, point: &PixelPoint) -> Option<(&Parcel, f64)> {
        let mut best: Option<(&Parcel, f64)> = None;
        for parcel in &self.parcels {
            let distance = parcel.centroid.distance_to(point);
            match best {
                Some((_, d)) if distance >= d => {}
                _ => best = Some((parcel, distance)),
            }
        }
        best
    }
}

/// One outer contour with its oriented corners
#[derive(Debug, Clone)]
struct RowContour {
    label: u32,
    left_edge: i32,
    corners: [PixelPoint; 4],
}

/// Copy of `image` inside a one-pixel background frame.
///
/// Contour tracing only follows blobs that are enclosed by background, so rows
/// running off the raster edge would otherwise produce no contour.
fn pad_border(image: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(image.width() + 2, image.height() + 2);
    image::imageops::replace(&mut padded, image, 1, 1);
    padded
}

/// Sort a rectangle's corners by x, then each side by y:
/// `[left_top, left_bottom, right_top, right_bottom]`
pub fn order_corners(mut corners: [PixelPoint; 4]) -> [PixelPoint; 4] {
    corners.sort_by(|a, b| a.x.total_cmp(&b.x));
    let (left, right) = corners.split_at_mut(2);
    left.sort_by(|a, b| a.y.total_cmp(&b.y));
    right.sort_by(|a, b| a.y.total_cmp(&b.y));
    corners
}

/// Number of parcels a row of length `distance` splits into.
///
/// The fractional remainder rounds up from `round_up_fraction`.
pub fn parcel_count(distance: f64, parcel_length: f64, round_up_fraction: f64) -> usize {
    let n = distance / parcel_length;
    if !n.is_finite() || n <= 0.0 {
        return 0;
    }
    if n.fract() >= round_up_fraction {
        n.ceil() as usize
    } else {
        n.floor() as usize
    }
}

/// Builds the [`ParcelGrid`] from row lines and the smoothed mask
pub struct ParcelGridBuilder<'a> {
    config: &'a ParcelConfig,
    parcel_length: f64,
}

impl<'a> ParcelGridBuilder<'a> {
    pub fn new(config: &'a ParcelConfig, parcel_length: f64) -> Self {
        Self {
            config,
            parcel_length,
        }
    }

    /// Rasterize rows, keep the masked part and clean it up
    pub fn row_blobs(&self, mask: &GrayImage, rows: &[RowSegment]) -> GrayImage {
        let (width, height) = mask.dimensions();
        let mut lines = GrayImage::new(width, height);
        for row in rows {
            draw_line(&mut lines, row.start, row.end, self.config.row_thickness, 255);
        }
        let masked = and_mask(&lines, mask);
        if self.config.median_radius > 0 {
            median_filter(&masked, self.config.median_radius, self.config.median_radius)
        } else {
            masked
        }
    }

    pub fn build(&self, mask: &GrayImage, rows: &[RowSegment]) -> GridResult<ParcelGrid> {
        if !(self.parcel_length.is_finite() && self.parcel_length > 0.0) {
            return Err(GridError::configuration(format!(
                "parcel_length must be positive, got {}",
                self.parcel_length
            )));
        }

        let mut stats = GridStats {
            rows: rows.len(),
            ..Default::default()
        };

        if rows.is_empty() || mask.width() == 0 || mask.height() == 0 {
            debug!("No rows to partition");
            return Ok(ParcelGrid {
                rows: rows.to_vec(),
                stats,
                ..Default::default()
            });
        }

        let blobs = self.row_blobs(mask, rows);
        let labels = connected_components(&blobs, Connectivity::Eight, Luma([0u8]));

        let mut pool = Vec::new();
        for contour in find_contours::<i32>(&pad_border(&blobs)) {
            if !matches!(contour.border_type, BorderType::Outer) || contour.parent.is_some() {
                continue;
            }
            stats.contours += 1;
            let points: Vec<Point<i32>> = contour.points.iter().map(|p| Point::new(p.x - 1, p.y - 1)).collect();
            match self.describe_contour(&points, &labels) {
                Some(row_contour) => pool.push(row_contour),
                None => stats.sliver_contours += 1,
            }
        }

        let ordered = self.sort_by_rows(pool, rows, &labels, &mut stats);

        let mut bands = Vec::with_capacity(ordered.len());
        let mut parcels = Vec::new();
        let mut current_row = None;
        let mut sequence = 0usize;

        for (row_index, contour) in ordered {
            if current_row != Some(row_index) {
                current_row = Some(row_index);
                sequence = 0;
            }
            let [left_top, left_bottom, right_top, right_bottom] = contour.corners;
            let band = RowBand {
                row_index,
                left_top,
                left_bottom,
                right_top,
                right_bottom,
            };
            sequence = self.partition_band(&band, sequence, &mut parcels)?;
            bands.push(band);
        }

        stats.bands = bands.len();
        stats.parcels = parcels.len();
        info!(
            rows = stats.rows,
            contours = stats.contours,
            parcels = stats.parcels,
            "Parcel grid built"
        );

        Ok(ParcelGrid {
            rows: rows.to_vec(),
            bands,
            parcels,
            stats,
        })
    }

    /// Oriented corners of one contour; `None` for slivers with a degenerate hull
    fn describe_contour(&self, points: &[Point<i32>], labels: &ImageBuffer<Luma<u32>, Vec<u32>>) -> Option<RowContour> {
        let first = points.first()?;
        let hull = convex_hull(points);
        if hull.len() < 3 {
            return None;
        }

        let rect = min_area_rect(hull.as_slice());
        let corners = order_corners(rect.map(|p| PixelPoint::new(p.x as f64, p.y as f64)));
        let left_edge = points.iter().map(|p| p.x).min()?;
        let label = labels.get_pixel(first.x as u32, first.y as u32)[0];

        Some(RowContour {
            label,
            left_edge,
            corners,
        })
    }

    /// Assign contours to the row line they overlap, in row generation order
    fn sort_by_rows(
        &self,
        mut pool: Vec<RowContour>,
        rows: &[RowSegment],
        labels: &ImageBuffer<Luma<u32>, Vec<u32>>,
        stats: &mut GridStats,
    ) -> Vec<(usize, RowContour)> {
        let (width, height) = labels.dimensions();
        let mut ordered = Vec::with_capacity(pool.len());

        for row in rows {
            if pool.is_empty() {
                break;
            }

            let mut touched = BTreeSet::new();
            let _ = for_each_line_pixel(row.start, row.end, self.config.row_thickness, width, height, |x, y| {
                let label = labels.get_pixel(x, y)[0];
                if label > 0 {
                    touched.insert(label);
                }
                ControlFlow::Continue(())
            });

            let (mut matched, rest): (Vec<_>, Vec<_>) =
                pool.into_iter().partition(|c| touched.contains(&c.label));
            pool = rest;

            matched.sort_by_key(|c| c.left_edge);
            ordered.extend(matched.into_iter().map(|c| (row.index, c)));
        }

        if !pool.is_empty() {
            warn!(count = pool.len(), "Contours not matched to any row were dropped");
            stats.unmatched_contours = pool.len();
        }

        ordered
    }

    /// Cut one band into parcels, continuing `sequence`; returns the next sequence number
    fn partition_band(&self, band: &RowBand, mut sequence: usize, parcels: &mut Vec<Parcel>) -> GridResult<usize> {
        let distance = band.length();
        let count = parcel_count(distance, self.parcel_length, self.config.round_up_fraction);
        if count == 0 {
            debug!(row = band.row_index, distance, "Row fragment too short for a parcel");
            return Ok(sequence);
        }

        let delta = (band.right_top - band.left_top) * (self.parcel_length / distance);

        for j in 0..count {
            let start_top = band.left_top + delta * j as f64;
            let start_bottom = band.left_bottom + delta * j as f64;
            let (end_bottom, end_top) = if j + 1 == count {
                (band.right_bottom, band.right_top)
            } else {
                (start_bottom + delta, start_top + delta)
            };

            let corners = [start_top, start_bottom, end_bottom, end_top];
            let index = parcels.len();
            let centroid = polygon_centroid(&corners, self.config.area_epsilon).map_err(|e| {
                GridError::geometry(format!(
                    "parcel {index} (row {}, sequence {sequence}): {e}",
                    band.row_index
                ))
            })?;

            parcels.push(Parcel {
                index,
                row_index: band.row_index,
                sequence,
                corners,
                centroid,
            });
            sequence += 1;
        }

        Ok(sequence)
    }
}
