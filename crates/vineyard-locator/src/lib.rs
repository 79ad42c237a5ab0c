//! # Vineyard Locator - Observation Localization
//!
//! Matches row-level drone frames to parcels of a built grid.
//! Features:
//! - GPS → pixel lookup through an R*-tree over the per-pixel table
//! - Heading ray / row intersection (analytic or raster)
//! - Global parcel deduplication
//! - Detector post-processing and frame spacing
//! - CSV / JSON survey export
//!
//! ## Flow
//!
//! 1. `survey` turns frames into observations (detector, NMS, middle plant, spacing)
//! 2. `assign` localizes every observation in parallel, then deduplicates
//! 3. `parcel_records` joins assignments back onto the grid for export

pub mod config;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod localizer;
pub mod mapper;
pub mod report;
pub mod tracker;

pub use config::{DistanceMetric, LocatorConfig, StrategyKind};
pub use dedup::AssignmentDeduplicator;
pub use detector::{Frame, FrameRecord, PlantDetector, RecordedDetections};
pub use error::{LocatorError, LocatorResult};
pub use localizer::{AnalyticIntersection, ObservationLocalizer, RasterIntersection, RowIntersectionStrategy};
pub use mapper::{CoordinateMapper, CoordinateTable};
pub use tracker::{SpacingDecision, TrackerState};

use chrono::{DateTime, Utc};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};
use vineyard_core::{
    Assignment, GeoCoord, Localization, Observation, ParcelRecord, PixelPoint, UnresolvedObservation,
};
use vineyard_grid::ParcelGrid;

/// Assignment counters
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub observations: usize,
    pub assigned: usize,
    pub unresolved: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

/// Result of one assignment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub generated_at: DateTime<Utc>,
    pub strategy: String,
    pub metric: DistanceMetric,
    pub assignments: Vec<Assignment>,
    pub stats: AssignmentStats,
}

impl AssignmentReport {
    /// Observation index holding each parcel
    pub fn parcel_owners(&self) -> BTreeMap<usize, usize> {
        self.assignments
            .iter()
            .filter_map(|a| a.parcel_index.map(|p| (p, a.observation_index)))
            .collect()
    }
}

/// Main locator that owns the grid, index and intersection strategy
pub struct PlantLocator {
    config: LocatorConfig,
    grid: ParcelGrid,
    mapper: CoordinateMapper,
    strategy: Box<dyn RowIntersectionStrategy>,
}

impl PlantLocator {
    /// Locator with the analytic strategy
    pub fn new(config: LocatorConfig, grid: ParcelGrid, mapper: CoordinateMapper) -> LocatorResult<Self> {
        config.validate()?;
        if config.strategy == StrategyKind::Raster {
            return Err(LocatorError::configuration(
                "raster strategy needs the smoothed mask, use PlantLocator::with_mask",
            ));
        }
        let strategy = Box::new(AnalyticIntersection::new(&grid));
        Ok(Self::assemble(config, grid, mapper, strategy))
    }

    /// Locator honouring `config.strategy`, rasterizing rows over `smoothed_mask` when needed
    pub fn with_mask(
        config: LocatorConfig,
        grid: ParcelGrid,
        mapper: CoordinateMapper,
        smoothed_mask: &GrayImage,
    ) -> LocatorResult<Self> {
        config.validate()?;
        let strategy: Box<dyn RowIntersectionStrategy> = match config.strategy {
            StrategyKind::Analytic => Box::new(AnalyticIntersection::new(&grid)),
            StrategyKind::Raster => {
                if smoothed_mask.dimensions() != mapper.dimensions() {
                    return Err(LocatorError::configuration(format!(
                        "mask is {:?} but coordinate table is {:?}",
                        smoothed_mask.dimensions(),
                        mapper.dimensions()
                    )));
                }
                Box::new(RasterIntersection::new(&grid, smoothed_mask, config.raster.clone()))
            }
        };
        Ok(Self::assemble(config, grid, mapper, strategy))
    }

    fn assemble(
        config: LocatorConfig,
        grid: ParcelGrid,
        mapper: CoordinateMapper,
        strategy: Box<dyn RowIntersectionStrategy>,
    ) -> Self {
        info!(
            strategy = strategy.name(),
            parcels = grid.len(),
            heading_deg = config.heading_deg,
            "📍 Plant locator ready"
        );
        Self {
            config,
            grid,
            mapper,
            strategy,
        }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn grid(&self) -> &ParcelGrid {
        &self.grid
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    fn localizer(&self) -> ObservationLocalizer<'_> {
        ObservationLocalizer::new(
            &self.grid,
            &self.mapper,
            self.strategy.as_ref(),
            self.config.heading(),
            self.config.min_drone_distance_px,
        )
    }

    pub fn localize(&self, observation: &Observation) -> Localization {
        self.localizer().localize(observation)
    }

    /// Localize every observation in parallel; output order follows input order
    pub fn localize_all(&self, observations: &[Observation]) -> Vec<Localization> {
        let localizer = self.localizer();
        observations.par_iter().map(|o| localizer.localize(o)).collect()
    }

    /// Localize, then deduplicate parcel claims
    pub fn assign(&self, observations: &[Observation]) -> AssignmentReport {
        let started = Instant::now();
        let localizations = self.localize_all(observations);
        let assignments = AssignmentDeduplicator::new(self.config.distance_metric).resolve(&localizations);

        let mut stats = AssignmentStats {
            observations: observations.len(),
            ..Default::default()
        };
        for assignment in &assignments {
            match assignment.unresolved {
                None => stats.assigned += 1,
                Some(reason) => *stats.unresolved.entry(reason_key(reason)).or_default() += 1,
            }
        }
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            observations = stats.observations,
            assigned = stats.assigned,
            unresolved = ?stats.unresolved,
            elapsed_ms = stats.elapsed_ms,
            "✅ Observations assigned"
        );

        AssignmentReport {
            generated_at: Utc::now(),
            strategy: self.strategy.name().to_string(),
            metric: self.config.distance_metric,
            assignments,
            stats,
        }
    }

    /// Turn raw frames into observations: detect, suppress, pick the middle plant, space out.
    ///
    /// A detector failure only affects its own frame: the observation is kept,
    /// flagged `detector_failed`, and left out of the spacing fold.
    pub fn survey(&self, frames: &[Frame], detector: &dyn PlantDetector) -> Vec<Observation> {
        let detector_config = &self.config.detector;
        let min_spacing_m = self.config.tracker.min_spacing_m;
        let mut state = TrackerState::default();
        let mut observations = Vec::with_capacity(frames.len());
        let mut failed = 0usize;

        for frame in frames {
            let raw = match detector.detect(frame) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(id = %frame.id, error = %e, "Detector failed, frame left unassigned");
                    failed += 1;
                    observations.push(Observation::new(frame.id.clone(), frame.gps).mark_detector_failed());
                    continue;
                }
            };
            let detections = detector::non_max_suppression(
                &raw,
                detector_config.score_threshold,
                detector_config.iou_threshold,
            );
            let plant = detector::select_middle_plant(&detections, frame.width, frame.height, detector_config);

            let (next, decision) = state.step(frame.gps, min_spacing_m);
            state = next;

            debug!(id = %frame.id, raw = raw.len(), kept = detections.len(), ?decision, "Frame surveyed");

            let mut observation = Observation::new(frame.id.clone(), frame.gps).with_detections(detections);
            observation.plant = plant;
            observation.redundant = decision == SpacingDecision::Redundant;
            observations.push(observation);
        }

        info!(
            frames = frames.len(),
            with_gps = state.frames_seen,
            detector_failures = failed,
            "Survey observations ready"
        );
        observations
    }

    /// One record per parcel, joined with the observation that claimed it
    pub fn parcel_records(&self, report: &AssignmentReport, observations: &[Observation]) -> Vec<ParcelRecord> {
        let owners = report.parcel_owners();
        self.grid
            .parcels()
            .iter()
            .map(|parcel| {
                let owner = owners.get(&parcel.index).and_then(|&i| {
                    let observation = observations.get(i);
                    if observation.is_none() {
                        warn!(observation = i, "Assignment points past the observation list");
                    }
                    observation
                });
                let plant = owner.and_then(|o| o.plant);
                let centroid_gps = self.grid_gps(parcel.centroid);

                ParcelRecord {
                    parcel_index: parcel.index,
                    row_index: parcel.row_index,
                    sequence: parcel.sequence,
                    corners: parcel.corner_array(),
                    centroid: parcel.centroid.to_array(),
                    centroid_gps,
                    observation_id: owner.map(|o| o.id.clone()),
                    confidence: plant.map(|p| p.confidence),
                    health: plant.map(|p| p.health),
                }
            })
            .collect()
    }

    /// Centroid GPS through the attached transform, `MISSING` without one
    fn grid_gps(&self, point: PixelPoint) -> GeoCoord {
        self.mapper.pixel_to_gps(&point).unwrap_or(GeoCoord::MISSING)
    }
}

fn reason_key(reason: UnresolvedObservation) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("{reason:?}"))
}

// ============================================================================
// TESTS
// ============================================================================
