//! JSON persistence of a built grid.
//!
//! Parcels and centers are grouped per row, corners as `[x, y]` pairs.

use crate::{GridError, GridResult, ParcelGrid};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;
use vineyard_core::{Parcel, PixelPoint, RowBand, RowSegment, polygon_centroid};

/// Maximum drift between a stored center and the recomputed centroid, in pixels
const CENTER_TOLERANCE_PX: f64 = 1e-3;

/// Serialized grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    /// Row lines as `[start, end]`
    pub rows: Vec<[[f64; 2]; 2]>,
    /// Parcel corners grouped per row
    pub parcels: Vec<Vec<[[f64; 2]; 4]>>,
    /// Parcel centers grouped like `parcels`
    pub centers: Vec<Vec<[f64; 2]>>,
    /// Signed perpendicular step of each row; generation order when absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_offsets: Vec<i32>,
    /// Row index of each parcel group; group position when absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_rows: Vec<usize>,
}

impl GridState {
    /// Snapshot of a grid, one group per row
    pub fn from_grid(grid: &ParcelGrid) -> Self {
        let mut parcels: Vec<Vec<[[f64; 2]; 4]>> = Vec::new();
        let mut centers: Vec<Vec<[f64; 2]>> = Vec::new();
        let mut group_rows = Vec::new();

        for parcel in grid.parcels() {
            if group_rows.last() != Some(&parcel.row_index) {
                parcels.push(Vec::new());
                centers.push(Vec::new());
                group_rows.push(parcel.row_index);
            }
            if let (Some(ps), Some(cs)) = (parcels.last_mut(), centers.last_mut()) {
                ps.push(parcel.corner_array());
                cs.push(parcel.centroid.to_array());
            }
        }

        Self {
            rows: grid.rows().iter().map(RowSegment::to_array).collect(),
            parcels,
            centers,
            row_offsets: grid.rows().iter().map(|r| r.offset).collect(),
            group_rows,
        }
    }

    /// Rebuild the grid, recomputing and checking every centroid
    pub fn to_grid(&self, area_epsilon: f64) -> GridResult<ParcelGrid> {
        if self.parcels.len() != self.centers.len() {
            return Err(GridError::shape_mismatch(format!(
                "{} parcel groups but {} center groups",
                self.parcels.len(),
                self.centers.len()
            )));
        }
        if !self.row_offsets.is_empty() && self.row_offsets.len() != self.rows.len() {
            return Err(GridError::shape_mismatch("row_offsets length differs from rows"));
        }
        if !self.group_rows.is_empty() && self.group_rows.len() != self.parcels.len() {
            return Err(GridError::shape_mismatch("group_rows length differs from parcel groups"));
        }

        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, [start, end])| {
                let offset = self.row_offsets.get(i).copied().unwrap_or(i as i32);
                RowSegment::new(i, offset, PixelPoint::from(*start), PixelPoint::from(*end))
            })
            .collect();

        let mut bands = Vec::with_capacity(self.parcels.len());
        let mut parcels = Vec::new();

        for (group, (corner_group, center_group)) in self.parcels.iter().zip(&self.centers).enumerate() {
            if corner_group.len() != center_group.len() {
                return Err(GridError::shape_mismatch(format!(
                    "group {group} has {} parcels but {} centers",
                    corner_group.len(),
                    center_group.len()
                )));
            }
            let row_index = self.group_rows.get(group).copied().unwrap_or(group);

            for (sequence, (corners, stored)) in corner_group.iter().zip(center_group).enumerate() {
                let corners = corners.map(PixelPoint::from);
                let index = parcels.len();
                let centroid = polygon_centroid(&corners, area_epsilon)
                    .map_err(|e| GridError::geometry(format!("stored parcel {index}: {e}")))?;
                let stored = PixelPoint::from(*stored);
                if centroid.distance_to(&stored) > CENTER_TOLERANCE_PX {
                    return Err(GridError::geometry(format!(
                        "stored parcel {index} center {:?} differs from centroid {:?}",
                        stored.to_array(),
                        centroid.to_array()
                    )));
                }
                parcels.push(Parcel {
                    index,
                    row_index,
                    sequence,
                    corners,
                    centroid,
                });
            }

            if let (Some(first), Some(last)) = (corner_group.first(), corner_group.last()) {
                bands.push(RowBand {
                    row_index,
                    left_top: first[0].into(),
                    left_bottom: first[1].into(),
                    right_top: last[3].into(),
                    right_bottom: last[2].into(),
                });
            }
        }

        Ok(ParcelGrid::from_parts(rows, bands, parcels))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> GridResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        info!(path = %path.as_ref().display(), parcels = self.parcels.iter().map(Vec::len).sum::<usize>(), "Saved grid state");
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> GridResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let state: GridState = serde_json::from_reader(reader)?;
        info!(path = %path.as_ref().display(), rows = state.rows.len(), "Loaded grid state");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, x1: f64, y0: f64, y1: f64) -> [PixelPoint; 4] {
        [
            PixelPoint::new(x0, y0),
            PixelPoint::new(x0, y1),
            PixelPoint::new(x1, y1),
            PixelPoint::new(x1, y0),
        ]
    }

    fn parcel(index: usize, row_index: usize, sequence: usize, corners: [PixelPoint; 4]) -> Parcel {
        let centroid = polygon_centroid(&corners, 1e-9).unwrap();
        Parcel {
            index,
            row_index,
            sequence,
            corners,
            centroid,
        }
    }

    fn sample_grid() -> ParcelGrid {
        let rows = vec![
            RowSegment::new(0, 0, PixelPoint::new(-100.0, 5.0), PixelPoint::new(200.0, 5.0)),
            RowSegment::new(1, 1, PixelPoint::new(-100.0, 25.0), PixelPoint::new(200.0, 25.0)),
        ];
        let parcels = vec![
            parcel(0, 0, 0, rect(0.0, 10.0, 0.0, 10.0)),
            parcel(1, 0, 1, rect(10.0, 20.0, 0.0, 10.0)),
            parcel(2, 1, 0, rect(0.0, 10.0, 20.0, 30.0)),
        ];
        ParcelGrid::from_parts(rows, Vec::new(), parcels)
    }

    #[test]
    fn test_state_groups_parcels_per_row() {
        let state = GridState::from_grid(&sample_grid());
        assert_eq!(state.rows.len(), 2);
        assert_eq!(state.parcels.len(), 2);
        assert_eq!(state.parcels[0].len(), 2);
        assert_eq!(state.centers[1], vec![[5.0, 25.0]]);
        assert_eq!(state.group_rows, vec![0, 1]);
    }

    #[test]
    fn test_save_and_load_rebuilds_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");

        let original = sample_grid();
        GridState::from_grid(&original).save_json(&path).unwrap();
        let rebuilt = GridState::load_json(&path).unwrap().to_grid(1e-6).unwrap();

        assert_eq!(rebuilt.parcels(), original.parcels());
        assert_eq!(rebuilt.rows(), original.rows());
        assert_eq!(rebuilt.bands().len(), 2);
        assert_eq!(rebuilt.bands()[0].right_top, PixelPoint::new(20.0, 0.0));
    }

    #[test]
    fn test_bare_state_without_optional_fields() {
        let json = r#"{
            "rows": [[[0,5],[100,5]]],
            "parcels": [[[[0,0],[0,10],[10,10],[10,0]]]],
            "centers": [[[5,5]]]
        }"#;
        let state: GridState = serde_json::from_str(json).unwrap();
        let grid = state.to_grid(1e-6).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.rows()[0].offset, 0);
    }

    #[test]
    fn test_tampered_center_is_rejected() {
        let mut state = GridState::from_grid(&sample_grid());
        state.centers[0][0] = [7.0, 5.0];
        assert!(matches!(state.to_grid(1e-6), Err(GridError::Geometry(_))));

        state.centers.pop();
        assert!(matches!(state.to_grid(1e-6), Err(GridError::ShapeMismatch(_))));
    }
}
