//! Compile-time registry of parking dataset definitions.
//!
//! Each dataset is defined in a TOML file under `datasets/`. The registry
//! embeds these at compile time and exposes them via [`all_datasets`] and
//! [`dataset`].

use std::path::PathBuf;

use can_i_park_athena::GeometryColumns;
use can_i_park_feature_models::{Attributes, FeatureKind, attribute_text};
use serde::Deserialize;

/// A parking dataset definition loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDefinition {
    /// Which feature kind this dataset provides.
    pub kind: FeatureKind,
    /// Human-readable name.
    pub name: String,
    /// `GeoJSON` file used by the local backend.
    pub default_path: PathBuf,
    /// Environment variable overriding `default_path`.
    pub path_env: String,
    /// Whether the local backend refuses to start without this dataset.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Search radius used when the caller does not give one.
    pub default_radius_m: f64,
    /// Source attribute names for the normalized fields.
    #[serde(default)]
    pub fields: FieldMapping,
    /// Athena table, if this dataset is queryable remotely.
    pub remote: Option<RemoteDefinition>,
}

/// Candidate source attribute names per normalized field.
///
/// The first candidate with a non-empty value wins. Lookups ignore case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldMapping {
    /// Category code.
    #[serde(default)]
    pub category: Vec<String>,
    /// Facility or segment name.
    #[serde(default)]
    pub name: Vec<String>,
    /// Street address.
    #[serde(default)]
    pub address: Vec<String>,
    /// Rule or sign text.
    #[serde(default)]
    pub text: Vec<String>,
}

impl FieldMapping {
    /// Returns the first non-empty value among `candidates`.
    #[must_use]
    pub fn first(candidates: &[String], attributes: &Attributes) -> Option<String> {
        candidates
            .iter()
            .find_map(|name| attribute_text(attributes, name))
    }
}

/// Athena location of a dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDefinition {
    /// Default Glue database.
    pub database: String,
    /// Default table.
    pub table: String,
    /// Environment variable overriding `database`.
    pub database_env: String,
    /// Environment variable overriding `table`.
    pub table_env: String,
    /// How the table stores geometry.
    pub geometry: GeometryColumns,
    /// Columns to coerce to floating point.
    #[serde(default)]
    pub numeric_fields: Vec<String>,
}

const fn default_true() -> bool {
    true
}

// ── Compile-time embedded TOML files ────────────────────────────────

const DATASET_TOMLS: &[(&str, &str)] = &[
    ("signs", include_str!("../datasets/signs.toml")),
    ("public_parking", include_str!("../datasets/public_parking.toml")),
    ("street_parking", include_str!("../datasets/street_parking.toml")),
];

/// Returns every dataset definition.
///
/// # Panics
///
/// Panics if any TOML definition is malformed (the definitions are
/// embedded, so this is caught by the registry tests).
#[must_use]
pub fn all_datasets() -> Vec<DatasetDefinition> {
    DATASET_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse dataset definition '{name}': {e}"))
        })
        .collect()
}

/// Returns the definition for `kind`, if one is registered.
#[must_use]
pub fn dataset(kind: FeatureKind) -> Option<DatasetDefinition> {
    all_datasets().into_iter().find(|d| d.kind == kind)
}
