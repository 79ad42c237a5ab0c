//! Plant detector boundary.
//!
//! The neural detector lives outside this crate; it is reached only through
//! [`PlantDetector`]. Raw boxes are cleaned with non-maximum suppression and
//! reduced to the plant in the middle of the frame.

use crate::config::DetectorConfig;
use crate::{LocatorError, LocatorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vineyard_core::{Detection, GeoCoord, ObservationId, PixelPoint, PlantReading};

/// One row-level camera frame as seen by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: ObservationId,
    /// `None` when the frame metadata carried no GPS fix
    pub gps: Option<GeoCoord>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(id: impl Into<ObservationId>, gps: Option<GeoCoord>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            gps,
            width,
            height,
        }
    }
}

/// Object detector producing plant boxes for a frame
#[cfg_attr(test, mockall::automock)]
pub trait PlantDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> LocatorResult<Vec<Detection>>;
}

/// Frame record with detector output already materialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: ObservationId,
    #[serde(default)]
    pub gps: Option<[f64; 2]>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    pub width: u32,
    pub height: u32,
}

impl FrameRecord {
    /// Frame view; the `[-1, -1]` placeholder and invalid pairs become `None`
    pub fn frame(&self) -> Frame {
        Frame::new(self.id.clone(), self.gps.and_then(GeoCoord::from_raw), self.width, self.height)
    }
}

/// Detector replaying recorded detections by frame id
#[derive(Debug, Clone, Default)]
pub struct RecordedDetections {
    detections: HashMap<ObservationId, Vec<Detection>>,
}

impl RecordedDetections {
    /// Index records by frame id; a repeated id is an error
    pub fn from_records(records: &[FrameRecord]) -> LocatorResult<Self> {
        let mut detections = HashMap::with_capacity(records.len());
        for record in records {
            if detections.insert(record.id.clone(), record.detections.clone()).is_some() {
                return Err(LocatorError::detector(format!("duplicate frame id {}", record.id)));
            }
        }
        Ok(Self { detections })
    }
}

impl PlantDetector for RecordedDetections {
    fn detect(&self, frame: &Frame) -> LocatorResult<Vec<Detection>> {
        self.detections
            .get(&frame.id)
            .cloned()
            .ok_or_else(|| LocatorError::detector(format!("no recorded detections for frame {}", frame.id)))
    }
}

/// Greedy non-maximum suppression over `[x0, y0, x1, y1]` boxes.
///
/// Keeps boxes scoring above `score_threshold`, strongest first, dropping any
/// box overlapping a kept one by more than `iou_threshold`.
pub fn non_max_suppression(detections: &[Detection], score_threshold: f64, iou_threshold: f64) -> Vec<Detection> {
    let mut candidates: Vec<Detection> = detections
        .iter()
        .copied()
        .filter(|d| d.confidence > score_threshold)
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// The plant in the middle of the frame.
///
/// Starts from the detection nearest the frame centre; a confident detection
/// within `width / center_band_divisor` of the centre overrides it (the last
/// such detection wins).
pub fn select_middle_plant(
    detections: &[Detection],
    width: u32,
    height: u32,
    config: &DetectorConfig,
) -> Option<PlantReading> {
    let center = PixelPoint::new((width / 2) as f64, (height / 2) as f64);
    let limit = (width / config.center_band_divisor.max(1)) as f64;

    let distances: Vec<f64> = detections.iter().map(|d| d.center().distance_to(&center)).collect();

    let mut selected = distances
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)?;

    for (i, (distance, detection)) in distances.iter().zip(detections).enumerate() {
        if *distance < limit && detection.confidence > config.override_confidence {
            selected = i;
        }
    }

    Some(PlantReading::from(detections[selected]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vineyard_core::HealthLabel;

    #[test]
    fn test_nms_suppresses_overlap() {
        let detections = vec![
            Detection::new([0.0, 0.0, 10.0, 10.0], 0.8),
            Detection::new([1.0, 0.0, 11.0, 10.0], 0.9),
            Detection::new([50.0, 50.0, 60.0, 60.0], 0.5),
            Detection::new([80.0, 80.0, 90.0, 90.0], 0.1),
        ];
        let kept = non_max_suppression(&detections, 0.15, 0.6);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn test_middle_plant_nearest_center() {
        let detections = vec![
            Detection::new([0.0, 0.0, 20.0, 20.0], 0.3),
            Detection::new([90.0, 40.0, 110.0, 60.0], 0.4),
        ];
        let plant = select_middle_plant(&detections, 200, 100, &DetectorConfig::default()).unwrap();
        assert_eq!(plant.bbox, [90.0, 40.0, 110.0, 60.0]);
        assert_eq!(plant.health, HealthLabel::Diseased);
    }

    #[test]
    fn test_confident_plant_in_band_overrides() {
        let detections = vec![
            Detection::new([95.0, 45.0, 105.0, 55.0], 0.3),
            Detection::new([110.0, 40.0, 130.0, 60.0], 0.95),
            Detection::new([150.0, 40.0, 170.0, 60.0], 0.99),
        ];
        // band is 200 / 6 = 33 px: the third box (60 px away) is outside it
        let plant = select_middle_plant(&detections, 200, 100, &DetectorConfig::default()).unwrap();
        assert_eq!(plant.bbox, [110.0, 40.0, 130.0, 60.0]);
        assert_eq!(plant.health, HealthLabel::Healthy);
    }

    #[test]
    fn test_no_detections_no_plant() {
        assert!(select_middle_plant(&[], 200, 100, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn test_recorded_detections() {
        let records = vec![FrameRecord {
            id: "IMG_1".into(),
            gps: Some([-1.0, -1.0]),
            detections: vec![Detection::new([0.0, 0.0, 1.0, 1.0], 0.7)],
            width: 640,
            height: 480,
        }];
        let detector = RecordedDetections::from_records(&records).unwrap();
        let frame = records[0].frame();
        assert!(frame.gps.is_none());
        assert_eq!(detector.detect(&frame).unwrap().len(), 1);

        let unknown = Frame::new("IMG_2", None, 640, 480);
        assert!(matches!(detector.detect(&unknown), Err(LocatorError::Detector(_))));
    }

    #[test]
    fn test_recorded_detections_reject_duplicate_ids() {
        let record = |score| FrameRecord {
            id: "IMG_1".into(),
            gps: None,
            detections: vec![Detection::new([0.0, 0.0, 1.0, 1.0], score)],
            width: 640,
            height: 480,
        };
        let result = RecordedDetections::from_records(&[record(0.7), record(0.4)]);
        assert!(matches!(result, Err(LocatorError::Detector(msg)) if msg.contains("IMG_1")));
    }

    #[test]
    fn test_mock_detector() {
        let mut mock = MockPlantDetector::new();
        mock.expect_detect()
            .times(1)
            .returning(|_| Ok(vec![Detection::new([0.0, 0.0, 4.0, 4.0], 0.9)]));
        let frame = Frame::new("IMG_3", None, 10, 10);
        assert_eq!(mock.detect(&frame).unwrap().len(), 1);
    }
}
