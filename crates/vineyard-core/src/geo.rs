//! Geographic types and calculations for the orthomosaic georeference

use crate::PixelPoint;
use serde::{Deserialize, Serialize};

/// Earth's radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// GPS coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoCoord {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl GeoCoord {
    /// Placeholder written for frames whose metadata carried no GPS fix
    pub const MISSING: Self = Self {
        latitude: -1.0,
        longitude: -1.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Interpret a raw `[lat, lon]` pair, mapping the missing-fix placeholder to `None`
    pub fn from_raw(raw: [f64; 2]) -> Option<Self> {
        let coord = Self::from(raw);
        (coord != Self::MISSING && coord.is_valid()).then_some(coord)
    }

    /// Check if this coordinate is finite and inside the lat/lon ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_to(&self, other: &GeoCoord) -> f64 {
        great_circle_distance(self, other)
    }

    /// Position on the unit sphere.
    ///
    /// Chord length between two such vectors grows monotonically with the
    /// great-circle distance, so Euclidean nearest neighbours here are also
    /// great-circle nearest neighbours.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    /// Convert to (latitude, longitude) tuple
    pub fn to_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl From<[f64; 2]> for GeoCoord {
    fn from(raw: [f64; 2]) -> Self {
        Self::new(raw[0], raw[1])
    }
}

impl From<GeoCoord> for [f64; 2] {
    fn from(c: GeoCoord) -> Self {
        [c.latitude, c.longitude]
    }
}

/// Haversine distance in meters between two coordinates
pub fn great_circle_distance(a: &GeoCoord, b: &GeoCoord) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Pixel → geographic affine transform, GDAL/rasterio coefficient order.
///
/// `longitude = a·col + b·row + c`, `latitude = d·col + e·row + f`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up raster: origin at the top-left corner, square-ish pixels
    pub fn north_up(origin_lon: f64, origin_lat: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_lon, 0.0, -pixel_height, origin_lat)
    }

    pub fn pixel_to_gps(&self, x: f64, y: f64) -> GeoCoord {
        let longitude = self.a * x + self.b * y + self.c;
        let latitude = self.d * x + self.e * y + self.f;
        GeoCoord::new(latitude, longitude)
    }

    pub fn point_to_gps(&self, p: &PixelPoint) -> GeoCoord {
        self.pixel_to_gps(p.x, p.y)
    }

    /// Determinant of the linear part; zero means the transform collapses the raster
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }
}

/// Apply `transform` to a pixel coordinate
pub fn pixel_to_gps(transform: &AffineTransform, x: f64, y: f64) -> GeoCoord {
    transform.pixel_to_gps(x, y)
}

// ============================================================================
// TESTS
// ============================================================================
