//! Proximity SQL for Athena's geospatial functions.

use can_i_park_feature_models::GeoPoint;
use serde::Deserialize;

/// Where a remote table keeps its geometry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryColumns {
    /// Explicit latitude / longitude columns (degrees).
    LatLng {
        /// Latitude column name.
        lat_column: String,
        /// Longitude column name.
        lng_column: String,
    },
    /// A WKB geometry column, reduced to its centroid.
    Wkb {
        /// Binary geometry column name.
        column: String,
    },
}

/// A fully qualified Athena table holding one feature kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTable {
    /// Data catalog, usually `AwsDataCatalog`.
    pub catalog: String,
    /// Glue database.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Geometry layout.
    pub geometry: GeometryColumns,
    /// Columns to coerce to `f64` when parsing results.
    #[serde(default)]
    pub numeric_fields: Vec<String>,
}

impl RemoteTable {
    /// `"catalog"."database"."table"`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.catalog),
            quote_ident(&self.database),
            quote_ident(&self.table)
        )
    }

    /// Result columns that carry raw geometry and should not be passed
    /// through as attributes.
    #[must_use]
    pub fn geometry_column(&self) -> Option<&str> {
        match &self.geometry {
            GeometryColumns::LatLng { .. } => None,
            GeometryColumns::Wkb { column } => Some(column),
        }
    }
}

/// Longest possible ground distance: half the equatorial circumference.
const MAX_GROUND_DISTANCE_M: f64 = std::f64::consts::PI * 6_378_137.0;

/// Radius as it is written into the query: clamped to
/// `0..=MAX_GROUND_DISTANCE_M`, with NaN treated as zero.
fn sql_radius(radius_m: f64) -> f64 {
    if radius_m.is_nan() {
        0.0
    } else {
        radius_m.clamp(0.0, MAX_GROUND_DISTANCE_M)
    }
}

/// Quotes an identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the radius query for `table` around `point`.
///
/// Distances are spherical ground meters from
/// `ST_Distance(to_spherical_geography(..), to_spherical_geography(..))`.
/// Polygon tables are reduced to `ST_Centroid` of the WKB geometry. The
/// result always has `lat`, `lng` and `distance_m` columns in addition to
/// the table's own columns, ordered nearest first and limited to `top_n`.
/// Radii beyond half the Earth's circumference are written as that bound.
#[must_use]
pub fn build_nearby_sql(table: &RemoteTable, point: GeoPoint, radius_m: f64, top_n: usize) -> String {
    let (representative, lat_expr, lng_expr) = match &table.geometry {
        GeometryColumns::LatLng {
            lat_column,
            lng_column,
        } => {
            let lat = format!("t.{}", quote_ident(lat_column));
            let lng = format!("t.{}", quote_ident(lng_column));
            (format!("ST_Point({lng}, {lat})"), lat, lng)
        }
        GeometryColumns::Wkb { column } => {
            let centroid = format!("ST_Centroid(ST_GeomFromBinary(t.{}))", quote_ident(column));
            (
                centroid.clone(),
                format!("ST_Y({centroid})"),
                format!("ST_X({centroid})"),
            )
        }
    };
    let distance = format!("ST_Distance(to_spherical_geography({representative}), qp.geom)");

    format!(
        "WITH query_point AS (\n    \
            SELECT to_spherical_geography(ST_Point({lng}, {lat})) AS geom\n\
        )\n\
        SELECT\n    \
            t.*,\n    \
            {lat_expr} AS lat,\n    \
            {lng_expr} AS lng,\n    \
            {distance} AS distance_m\n\
        FROM {from} t\n\
        CROSS JOIN query_point qp\n\
        WHERE {lat_expr} IS NOT NULL\n  \
            AND {lng_expr} IS NOT NULL\n  \
            AND {distance} <= {radius_m}\n\
        ORDER BY distance_m ASC\n\
        LIMIT {top_n}",
        lng = point.lng,
        lat = point.lat,
        radius_m = sql_radius(radius_m),
        from = table.qualified_name(),
    )
}
