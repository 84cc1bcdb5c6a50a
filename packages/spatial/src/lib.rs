#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory geometry store for parking features.
//!
//! Loads a `GeoJSON` `FeatureCollection` once at startup, keeps the
//! features in WGS84 for output, and maintains a parallel Web Mercator
//! copy indexed in an R-tree for metric radius queries. The dataset is
//! immutable after loading, so a single instance can be shared across
//! concurrent queries without locking.

mod dataset;

pub use dataset::{DatasetFeature, GeometryDataset, NearbyFeature};

use can_i_park_feature_models::{Crs, MercatorPoint};
use geo::MapCoords;
use geojson::JsonObject;

/// Errors that can occur while loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// The dataset file could not be read.
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid `GeoJSON`.
    #[error("Failed to parse GeoJSON: {0}")]
    Parse(#[from] Box<geojson::Error>),

    /// The document parsed but is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// The `crs` member names a CRS this store cannot reproject.
    #[error("Unsupported dataset CRS: {name}")]
    UnsupportedCrs {
        /// The CRS name as declared in the document.
        name: String,
    },

    /// No feature in the document had usable geometry.
    #[error("Dataset contains no usable features ({total} rows read)")]
    Empty {
        /// Number of rows in the source document.
        total: usize,
    },
}

impl From<geojson::Error> for DatasetError {
    fn from(e: geojson::Error) -> Self {
        Self::Parse(Box::new(e))
    }
}

/// Reads the legacy `crs` member of a `FeatureCollection`.
///
/// Documents without one are WGS84 per RFC 7946.
fn source_crs(foreign_members: Option<&JsonObject>) -> Result<Crs, DatasetError> {
    let Some(crs) = foreign_members.and_then(|m| m.get("crs")) else {
        return Ok(Crs::Wgs84);
    };
    let name = crs["properties"]["name"].as_str().unwrap_or_default();
    Crs::from_name(name).ok_or_else(|| DatasetError::UnsupportedCrs {
        name: name.to_string(),
    })
}

/// Converts a `GeoJSON` geometry into a WGS84 [`geo::Geometry`].
///
/// Returns `None` for geometries the `geo` types cannot represent.
fn to_wgs84(geometry: geojson::Geometry, crs: Crs) -> Option<geo::Geometry<f64>> {
    let geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    Some(match crs {
        Crs::Wgs84 => geometry,
        Crs::WebMercator => geometry.map_coords(|c| {
            let p = MercatorPoint::new(c.x, c.y).to_geographic();
            geo::coord! { x: p.lng, y: p.lat }
        }),
    })
}

/// Projects a WGS84 geometry into Web Mercator.
fn to_mercator(geometry: &geo::Geometry<f64>) -> geo::Geometry<f64> {
    geometry.map_coords(|c| {
        let p = can_i_park_feature_models::GeoPoint { lat: c.y, lng: c.x }.to_mercator();
        geo::coord! { x: p.x, y: p.y }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_crs_defaults_to_wgs84() {
        assert_eq!(source_crs(None).unwrap(), Crs::Wgs84);
        assert_eq!(source_crs(Some(&JsonObject::new())).unwrap(), Crs::Wgs84);
    }

    #[test]
    fn reads_named_crs() {
        let members = serde_json::json!({
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } }
        });
        let members = members.as_object().unwrap();
        assert_eq!(source_crs(Some(members)).unwrap(), Crs::WebMercator);
    }

    #[test]
    fn rejects_unknown_crs() {
        let members = serde_json::json!({
            "crs": { "type": "name", "properties": { "name": "EPSG:2926" } }
        });
        let members = members.as_object().unwrap();
        assert!(matches!(
            source_crs(Some(members)),
            Err(DatasetError::UnsupportedCrs { name }) if name == "EPSG:2926"
        ));
    }
}
