#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parking feature types shared by the proximity backends.
//!
//! These are the shapes that flow through a proximity lookup: a validated
//! query point, the raw per-backend feature records, and the normalized
//! record handed back to callers. Coordinates carry their CRS in the type
//! (see [`coordinate`]).

pub mod coordinate;
pub mod sign_category;

pub use coordinate::{CoordinateError, Crs, GeoPoint, MercatorPoint, validate};
pub use sign_category::SignCategory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// Free-form attribute bag carried through from the source row.
pub type Attributes = Map<String, Value>;

/// The dataset a feature belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// Street parking signs (points).
    Sign,
    /// Public garages and parking lots (polygons, reduced to centroids).
    PublicParking,
    /// Street parking segments (line strings).
    StreetParking,
}

impl FeatureKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Sign, Self::PublicParking, Self::StreetParking]
    }
}

/// A proximity query: where to look, how far, and how many results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRequest {
    /// Validated query point.
    pub point: GeoPoint,
    /// Search radius in ground meters.
    pub radius_meters: f64,
    /// Maximum number of results.
    pub top_n: usize,
    /// Log the constructed query and intermediate distances.
    pub debug: bool,
}

impl QueryRequest {
    /// Validates the coordinates and builds a request.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if the coordinates are invalid.
    pub fn new(
        lat: f64,
        lng: f64,
        radius_meters: f64,
        top_n: usize,
    ) -> Result<Self, CoordinateError> {
        Ok(Self {
            point: validate(lat, lng)?,
            radius_meters,
            top_n,
            debug: false,
        })
    }

    /// Sets the debug flag.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Whether this request can match anything at all.
    ///
    /// A negative, NaN or infinite radius, or a `top_n` of zero, selects
    /// nothing. A zero radius still matches features exactly at the query
    /// point.
    #[must_use]
    pub fn is_satisfiable(&self) -> bool {
        self.top_n > 0 && self.radius_meters.is_finite() && self.radius_meters >= 0.0
    }
}

/// A feature as produced by a backend, before normalization.
///
/// Coordinates are WGS84. Any of them may be missing when the backend
/// could not produce a usable value; such rows are dropped during
/// normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeature {
    /// Identifier from the source, if any.
    pub id: Option<String>,
    /// Latitude of the representative point.
    pub lat: Option<f64>,
    /// Longitude of the representative point.
    pub lng: Option<f64>,
    /// Ground distance from the query point, valid for one query only.
    pub distance_m: Option<f64>,
    /// Remaining source columns / properties.
    pub attributes: Attributes,
}

/// A feature as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFeature {
    /// Source identifier, or one derived from kind and position.
    pub id: String,
    /// Dataset this feature came from.
    pub kind: FeatureKind,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lng: f64,
    /// Ground distance from the query point in meters.
    pub distance_m: f64,
    /// Raw category code from the source.
    pub category: Option<String>,
    /// Human-readable category description.
    pub description: Option<String>,
    /// Facility or segment name.
    pub name: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Rule or sign text.
    pub text: Option<String>,
    /// Map deep link for the feature location.
    pub maps_url: String,
    /// Passthrough source attributes.
    pub attributes: Attributes,
}

/// Looks up an attribute by name, falling back to a case-insensitive
/// match.
#[must_use]
pub fn attribute<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a Value> {
    attributes.get(name).or_else(|| {
        attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Reads an attribute as display text.
///
/// Numbers and booleans are stringified; null, empty strings, arrays and
/// objects yield `None`.
#[must_use]
pub fn attribute_text(attributes: &Attributes, name: &str) -> Option<String> {
    match attribute(attributes, name)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
