//! Survey export: one row per parcel as CSV or JSON

use crate::LocatorResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;
use vineyard_core::{HealthLabel, ParcelRecord};

/// Flat CSV row for a [`ParcelRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRow {
    pub parcel_index: usize,
    pub row_index: usize,
    pub sequence: usize,
    pub corner0_x: f64,
    pub corner0_y: f64,
    pub corner1_x: f64,
    pub corner1_y: f64,
    pub corner2_x: f64,
    pub corner2_y: f64,
    pub corner3_x: f64,
    pub corner3_y: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub observation_id: Option<String>,
    pub confidence: Option<f64>,
    pub health: Option<HealthLabel>,
}

impl From<&ParcelRecord> for ParcelRow {
    fn from(r: &ParcelRecord) -> Self {
        let [c0, c1, c2, c3] = r.corners;
        Self {
            parcel_index: r.parcel_index,
            row_index: r.row_index,
            sequence: r.sequence,
            corner0_x: c0[0],
            corner0_y: c0[1],
            corner1_x: c1[0],
            corner1_y: c1[1],
            corner2_x: c2[0],
            corner2_y: c2[1],
            corner3_x: c3[0],
            corner3_y: c3[1],
            centroid_x: r.centroid[0],
            centroid_y: r.centroid[1],
            latitude: r.centroid_gps.latitude,
            longitude: r.centroid_gps.longitude,
            observation_id: r.observation_id.as_ref().map(|id| id.to_string()),
            confidence: r.confidence,
            health: r.health,
        }
    }
}

/// Write records as CSV with a header row
pub fn write_csv<W: Write>(writer: W, records: &[ParcelRecord]) -> LocatorResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(ParcelRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file(path: impl AsRef<Path>, records: &[ParcelRecord]) -> LocatorResult<()> {
    write_csv(BufWriter::new(File::create(path.as_ref())?), records)?;
    info!(path = %path.as_ref().display(), records = records.len(), "📄 Wrote parcel CSV");
    Ok(())
}

pub fn write_json_file<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> LocatorResult<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, value)?;
    info!(path = %path.as_ref().display(), "📄 Wrote JSON report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vineyard_core::GeoCoord;

    fn record(observation: Option<&str>) -> ParcelRecord {
        ParcelRecord {
            parcel_index: 4,
            row_index: 1,
            sequence: 2,
            corners: [[0.0, 0.0], [0.0, 8.0], [50.0, 8.0], [50.0, 0.0]],
            centroid: [25.0, 4.0],
            centroid_gps: GeoCoord::new(41.5, 2.25),
            observation_id: observation.map(Into::into),
            confidence: observation.map(|_| 0.87),
            health: observation.map(|_| HealthLabel::Healthy),
        }
    }

    #[test]
    fn test_csv_layout() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[record(Some("IMG_7")), record(None)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("parcel_index,row_index,sequence,corner0_x"));
        assert!(lines[0].ends_with("observation_id,confidence,health"));
        assert!(lines[1].ends_with("IMG_7,0.87,HEALTHY"));
        assert!(lines[2].ends_with(",,,"));
    }

    #[test]
    fn test_csv_reads_back() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[record(Some("IMG_7"))]).unwrap();
        let mut reader = csv::Reader::from_reader(buffer.as_slice());
        let row: ParcelRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row, ParcelRow::from(&record(Some("IMG_7"))));
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.json");
        write_json_file(&path, &[record(None)]).unwrap();
        let back: Vec<ParcelRecord> = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(back, vec![record(None)]);
    }
}
