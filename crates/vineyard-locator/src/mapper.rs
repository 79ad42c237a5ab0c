//! Pixel ↔ GPS conversion.
//!
//! GPS → pixel is a nearest-neighbour lookup in the per-pixel coordinate
//! table. Table entries are indexed as unit-sphere vectors in an R*-tree; the
//! nearest chord is the nearest great circle, so the lookup is exact.

use crate::{LocatorError, LocatorResult};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};
use vineyard_core::{AffineTransform, CoreError, GeoCoord, PixelPoint};
use vineyard_grid::Orthomosaic;

type IndexedCoord = GeomWithData<[f64; 3], usize>;

/// Per-pixel GPS table as stored on disk, `[lat, lon]` entries in row-major order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateTable {
    pub width: u32,
    pub height: u32,
    pub coordinates: Vec<[f64; 2]>,
}

impl CoordinateTable {
    pub fn load_json(path: impl AsRef<Path>) -> LocatorResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Table generated from an affine transform
    pub fn from_transform(transform: &AffineTransform, width: u32, height: u32) -> Self {
        let coordinates = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| transform.pixel_to_gps(x as f64, y as f64).into())
            .collect();
        Self {
            width,
            height,
            coordinates,
        }
    }
}

/// Converts between raster pixels and GPS coordinates
#[derive(Debug)]
pub struct CoordinateMapper {
    width: u32,
    height: u32,
    index: RTree<IndexedCoord>,
    transform: Option<AffineTransform>,
}

impl CoordinateMapper {
    /// Index a row-major table; its length must equal `width × height`
    pub fn new(table: &[GeoCoord], width: u32, height: u32) -> LocatorResult<Self> {
        let expected = width as usize * height as usize;
        if table.is_empty() {
            return Err(LocatorError::coordinate_table("coordinate table is empty"));
        }
        if table.len() != expected {
            return Err(LocatorError::coordinate_table(format!(
                "table has {} entries but raster is {width}x{height} ({expected})",
                table.len()
            )));
        }
        if let Some(bad) = table.iter().find(|c| !c.is_valid()) {
            return Err(CoreError::invalid_coordinate(bad.latitude, bad.longitude).into());
        }

        let entries = table
            .iter()
            .enumerate()
            .map(|(i, coord)| GeomWithData::new(coord.to_unit_vector(), i))
            .collect();
        let index = RTree::bulk_load(entries);
        debug!(entries = expected, width, height, "Coordinate index built");

        Ok(Self {
            width,
            height,
            index,
            transform: None,
        })
    }

    pub fn from_table(table: &CoordinateTable) -> LocatorResult<Self> {
        let coords: Vec<GeoCoord> = table.coordinates.iter().copied().map(GeoCoord::from).collect();
        Self::new(&coords, table.width, table.height)
    }

    /// Mapper over the orthomosaic's own transform
    pub fn from_orthomosaic(ortho: &Orthomosaic) -> LocatorResult<Self> {
        let (width, height) = ortho.dimensions();
        info!(width, height, "Indexing orthomosaic coordinate table");
        let mut mapper = Self::new(&ortho.coordinate_table(), width, height)?;
        mapper.transform = Some(*ortho.transform());
        Ok(mapper)
    }

    /// Attach the forward transform used by [`CoordinateMapper::pixel_to_gps`]
    pub fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.index.size() == 0
    }

    /// Pixel of the table entry nearest `gps` by great-circle distance
    pub fn gps_to_pixel(&self, gps: &GeoCoord) -> LocatorResult<PixelPoint> {
        if !gps.is_valid() {
            return Err(CoreError::invalid_coordinate(gps.latitude, gps.longitude).into());
        }
        let nearest = self
            .index
            .nearest_neighbor(&gps.to_unit_vector())
            .ok_or_else(|| LocatorError::coordinate_table("coordinate index is empty"))?;
        let i = nearest.data;
        let width = self.width as usize;
        Ok(PixelPoint::new((i % width) as f64, (i / width) as f64))
    }

    /// Forward transform, when one is attached
    pub fn pixel_to_gps(&self, point: &PixelPoint) -> Option<GeoCoord> {
        self.transform.map(|t| t.point_to_gps(point))
    }
}
