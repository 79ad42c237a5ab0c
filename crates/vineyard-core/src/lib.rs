//! # Vineyard Core
//!
//! Core domain models and types for the vineyard parcel survey.
//! This crate provides the shared types used by the grid builder, the
//! observation locator and the batch runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod error;
pub mod geo;
pub mod geometry;

pub use error::{CoreError, CoreResult};
pub use geo::*;
pub use geometry::*;

// ============================================================================
// OBSERVATION MODELS
// ============================================================================

/// Unique identifier for a row-level observation frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub String);

impl ObservationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ObservationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObservationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Detector output for one plant: `[x0, y0, x1, y1]` box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub confidence: f64,
}

impl Detection {
    pub fn new(bbox: [f64; 4], confidence: f64) -> Self {
        Self { bbox, confidence }
    }

    pub fn width(&self) -> f64 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Intersection over union of two boxes
    pub fn iou(&self, other: &Detection) -> f64 {
        let ix0 = self.bbox[0].max(other.bbox[0]);
        let iy0 = self.bbox[1].max(other.bbox[1]);
        let ix1 = self.bbox[2].min(other.bbox[2]);
        let iy1 = self.bbox[3].min(other.bbox[3]);

        let intersection = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 { intersection / union } else { 0.0 }
    }
}

/// Plant health class derived from the detector confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLabel {
    Healthy,
    Diseased,
}

impl HealthLabel {
    /// Confidence rounds to 1 → healthy
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence.round() >= 1.0 {
            Self::Healthy
        } else {
            Self::Diseased
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthLabel::Healthy => write!(f, "HEALTHY"),
            HealthLabel::Diseased => write!(f, "DISEASED"),
        }
    }
}

/// The plant reported by a frame (the detection in the middle of the image)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantReading {
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub health: HealthLabel,
}

impl From<Detection> for PlantReading {
    fn from(d: Detection) -> Self {
        Self {
            bbox: d.bbox,
            confidence: d.confidence,
            health: HealthLabel::from_confidence(d.confidence),
        }
    }
}

/// One drone/row-image frame ready for localization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    /// GPS fix from the frame metadata; `None` when the metadata had no fix
    pub gps: Option<GeoCoord>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub plant: Option<PlantReading>,
    /// Captured too close to the previously accepted frame
    #[serde(default)]
    pub redundant: bool,
    /// The detector failed on this frame; `detections` is empty
    #[serde(default)]
    pub detector_failed: bool,
}

impl Observation {
    pub fn new(id: impl Into<ObservationId>, gps: Option<GeoCoord>) -> Self {
        Self {
            id: id.into(),
            gps,
            detections: Vec::new(),
            plant: None,
            redundant: false,
            detector_failed: false,
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    pub fn with_plant(mut self, plant: PlantReading) -> Self {
        self.plant = Some(plant);
        self
    }

    pub fn mark_redundant(mut self) -> Self {
        self.redundant = true;
        self
    }

    pub fn mark_detector_failed(mut self) -> Self {
        self.detector_failed = true;
        self.detections.clear();
        self.plant = None;
        self
    }
}

// ============================================================================
// GRID MODELS
// ============================================================================

/// One generated row line, extended well past the visible vineyard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowSegment {
    /// Generation order
    pub index: usize,
    /// Signed number of row separations from the seed row
    pub offset: i32,
    pub start: PixelPoint,
    pub end: PixelPoint,
}

impl RowSegment {
    pub fn new(index: usize, offset: i32, start: PixelPoint, end: PixelPoint) -> Self {
        Self {
            index,
            offset,
            start,
            end,
        }
    }

    pub fn line(&self) -> ImplicitLine {
        ImplicitLine::through(self.start, self.end)
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn to_array(&self) -> [[f64; 2]; 2] {
        [self.start.to_array(), self.end.to_array()]
    }
}

/// Oriented corners of one row contour, sorted by x then y
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowBand {
    pub row_index: usize,
    pub left_top: PixelPoint,
    pub left_bottom: PixelPoint,
    pub right_top: PixelPoint,
    pub right_bottom: PixelPoint,
}

impl RowBand {
    /// Along-row pixel length
    pub fn length(&self) -> f64 {
        self.left_top.distance_to(&self.right_top)
    }
}

/// Fixed-length cell of a row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    /// Position in the flattened grid
    pub index: usize,
    pub row_index: usize,
    /// Position within the row
    pub sequence: usize,
    /// `[start_top, start_bottom, end_bottom, end_top]`
    pub corners: [PixelPoint; 4],
    pub centroid: PixelPoint,
}

impl Parcel {
    pub fn corner_array(&self) -> [[f64; 2]; 4] {
        self.corners.map(|c| c.to_array())
    }

    /// Along-row length measured on the top edge
    pub fn length(&self) -> f64 {
        self.corners[0].distance_to(&self.corners[3])
    }
}

// ============================================================================
// LOCALIZATION MODELS
// ============================================================================

/// Why an observation ended without a parcel. Expected outcome, not a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnresolvedObservation {
    #[error("frame has no GPS fix")]
    MissingGps,

    #[error("detector failed on the frame")]
    DetectorFailed,

    #[error("detector reported no plants")]
    NoDetections,

    #[error("frame too close to the previous accepted frame")]
    RedundantFrame,

    #[error("heading ray crosses no row")]
    NoRowIntersection,

    #[error("nearest parcel lies under the drone itself")]
    ImplausibleParcel,

    #[error("parcel claimed by a closer observation")]
    DuplicateClaim,
}

/// Parcel proposed for one observation before deduplication
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub parcel_index: usize,
    /// Row crossed by the heading ray, when the strategy knows it
    pub row_index: Option<usize>,
    pub drone_pixel: PixelPoint,
    pub intersection: PixelPoint,
    /// Drone pixel → ray/row crossing
    pub ray_distance: f64,
    /// Ray/row crossing → parcel centroid
    pub match_distance: f64,
}

/// Per-observation result of the localizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Localization {
    Located(Candidate),
    Unassigned(UnresolvedObservation),
}

impl Localization {
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Localization::Located(c) => Some(c),
            Localization::Unassigned(_) => None,
        }
    }

    pub fn is_located(&self) -> bool {
        matches!(self, Localization::Located(_))
    }
}

/// Final, deduplicated outcome for one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub observation_index: usize,
    pub parcel_index: Option<usize>,
    /// Candidate data survives deselection untouched
    pub candidate: Option<Candidate>,
    pub unresolved: Option<UnresolvedObservation>,
}

impl Assignment {
    pub fn is_assigned(&self) -> bool {
        self.parcel_index.is_some()
    }
}

/// Exported per-parcel survey row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub parcel_index: usize,
    pub row_index: usize,
    pub sequence: usize,
    pub corners: [[f64; 2]; 4],
    pub centroid: [f64; 2],
    pub centroid_gps: GeoCoord,
    pub observation_id: Option<ObservationId>,
    pub confidence: Option<f64>,
    pub health: Option<HealthLabel>,
}

// ============================================================================
// TESTS
// ============================================================================
