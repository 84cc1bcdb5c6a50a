//! Coordinate values tagged with their coordinate reference system.
//!
//! [`GeoPoint`] is always geographic WGS84 degrees (EPSG:4326) and
//! [`MercatorPoint`] is always spherical Web Mercator meters
//! (EPSG:3857). Keeping them as distinct types means a degree value can
//! never be fed into metric distance math by accident.

use std::f64::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Sphere radius used by EPSG:3857, in meters.
pub const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which Web Mercator's square world ends.
pub const WEB_MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
pub enum Crs {
    /// Geographic WGS84 degrees.
    #[strum(serialize = "EPSG:4326")]
    #[serde(rename = "EPSG:4326")]
    Wgs84,
    /// Spherical Web Mercator meters.
    #[strum(serialize = "EPSG:3857")]
    #[serde(rename = "EPSG:3857")]
    WebMercator,
}

impl Crs {
    /// Returns the EPSG code for this CRS.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
        }
    }

    /// Parses a CRS name as found in a `GeoJSON` `crs` member.
    ///
    /// Accepts `EPSG:<code>`, the OGC URN forms
    /// (`urn:ogc:def:crs:EPSG::<code>`) and `CRS84`. Web Mercator's
    /// historical alias 900913 is recognized too.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.ends_with("CRS84") {
            return Some(Self::Wgs84);
        }
        let code = name.rsplit(':').next()?;
        match code.trim() {
            "4326" => Some(Self::Wgs84),
            "3857" | "900913" | "102100" => Some(Self::WebMercator),
            _ => None,
        }
    }
}

/// A latitude/longitude pair in WGS84 degrees.
///
/// Values built through [`validate`] are guaranteed to be finite and in
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, -90 to 90.
    pub lat: f64,
    /// Longitude in degrees, -180 to 180.
    pub lng: f64,
}

impl GeoPoint {
    /// Validates and creates a point.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if either component is not finite or is
    /// out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        validate(lat, lng)
    }

    /// Projects this point into Web Mercator.
    ///
    /// Latitudes beyond [`WEB_MERCATOR_MAX_LATITUDE`] are clamped, so the
    /// poles map to the top and bottom edges of the projection instead of
    /// infinity.
    #[must_use]
    pub fn to_mercator(self) -> MercatorPoint {
        let lat = self
            .lat
            .clamp(-WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_MAX_LATITUDE)
            .to_radians();
        let x = WEB_MERCATOR_RADIUS_M * self.lng.to_radians();
        let y = WEB_MERCATOR_RADIUS_M * (FRAC_PI_4 + lat / 2.0).tan().ln();
        MercatorPoint { x, y }
    }
}

/// A projected point in Web Mercator meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MercatorPoint {
    /// Easting in meters.
    pub x: f64,
    /// Northing in meters.
    pub y: f64,
}

impl MercatorPoint {
    /// Creates a projected point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Inverse-projects this point back to WGS84 degrees.
    #[must_use]
    pub fn to_geographic(self) -> GeoPoint {
        let lng = (self.x / WEB_MERCATOR_RADIUS_M).to_degrees();
        let lat = (self.y / WEB_MERCATOR_RADIUS_M).sinh().atan().to_degrees();
        GeoPoint { lat, lng }
    }

    /// Straight-line distance in projected units.
    #[must_use]
    pub fn planar_distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Ground distance in meters between two projected points.
    ///
    /// Web Mercator inflates lengths by `1 / cos(latitude)`; the planar
    /// distance is scaled back by the cosine of the midpoint latitude.
    /// Accurate to well under a percent over the few-kilometer radii used
    /// for parking lookups.
    /// Eastings are compared as-is, without wrapping at the antimeridian.
    #[must_use]
    pub fn ground_distance(self, other: Self) -> f64 {
        let mid = Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0);
        self.planar_distance(other) * mid.scale_factor()
    }

    /// Ratio of ground meters to projected meters at this point.
    #[must_use]
    pub fn scale_factor(self) -> f64 {
        self.to_geographic().lat.to_radians().cos()
    }
}

/// Error returned when a latitude/longitude pair is rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    /// A component is NaN or infinite.
    NotFinite {
        /// The rejected latitude.
        lat: f64,
        /// The rejected longitude.
        lng: f64,
    },
    /// A component is outside its valid range.
    OutOfRange {
        /// The rejected latitude.
        lat: f64,
        /// The rejected longitude.
        lng: f64,
    },
}

impl std::fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinite { lat, lng } => {
                write!(f, "invalid lat/lon ({lat}, {lng}): not a finite coordinate")
            }
            Self::OutOfRange { lat, lng } => write!(
                f,
                "invalid lat/lon ({lat}, {lng}): lat must be between -90 and 90, \
                 lon between -180 and 180"
            ),
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Checks that `lat`/`lng` form a valid WGS84 coordinate.
///
/// Both bounds are inclusive.
///
/// # Errors
///
/// Returns [`CoordinateError::NotFinite`] for NaN or infinite input and
/// [`CoordinateError::OutOfRange`] when latitude is outside [-90, 90] or
/// longitude is outside [-180, 180].
pub fn validate(lat: f64, lng: f64) -> Result<GeoPoint, CoordinateError> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(CoordinateError::NotFinite { lat, lng });
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(CoordinateError::OutOfRange { lat, lng });
    }
    Ok(GeoPoint { lat, lng })
}
