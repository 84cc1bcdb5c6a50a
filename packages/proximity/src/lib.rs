#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearby parking lookups.
//!
//! [`ProximityEngine`] answers "what parking features are within `r`
//! meters of this point" for signs, public garages/lots and street
//! segments. It does not care where the features live: a
//! [`FeatureSource`] is chosen once at startup (the in-memory
//! [`LocalSource`] or the Athena-backed [`RemoteSource`]) and every query
//! goes through the same validate, fetch, normalize, filter, sort and
//! truncate sequence, so both backends return the same shape of result.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PARKING_BACKEND` | `local` | `local` or `athena` |
//! | `SIGNS_DATASET_PATH` | see `datasets/signs.toml` | Sign `GeoJSON` |
//! | `PUBLIC_PARKING_DATASET_PATH` | see `datasets/public_parking.toml` | Garage/lot `GeoJSON` |
//! | `STREET_PARKING_DATASET_PATH` | see `datasets/street_parking.toml` | Street segment `GeoJSON` |
//! | `AWS_REGION` | `us-west-2` | Athena region |
//! | `AWS_ATHENA_OUTPUT` | (required for `athena`) | `s3://` result location |
//! | `AWS_ATHENA_CATALOG` | `AwsDataCatalog` | Data catalog |
//! | `AWS_DB_SIG` / `AWS_TABLE_SIG` | see `datasets/signs.toml` | Sign table |
//! | `AWS_DB_PUB` / `AWS_TABLE_PUB` | see `datasets/public_parking.toml` | Garage/lot table |
//! | `ATHENA_POLL_INTERVAL_MS` | `1000` | Delay between status polls, at least 1 |
//! | `ATHENA_TIMEOUT_SECS` | `120` | Poll timeout, `0` to wait forever |

pub mod config;
pub mod engine;
pub mod normalize;
pub mod registry;
pub mod source;

pub use config::{Backend, ConfigError, ProximityConfig, build_engine};
pub use engine::{ParkingSearch, ProximityEngine};
pub use source::{FeatureSource, LocalSource, RemoteSource};

use std::time::Duration;

use can_i_park_athena::{AthenaError, QueryState};
use can_i_park_feature_models::{CoordinateError, FeatureKind};
use can_i_park_spatial::DatasetError;

/// Errors surfaced to callers of the proximity engine.
#[derive(Debug, thiserror::Error)]
pub enum ProximityError {
    /// The query coordinates are malformed or out of range.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    /// A caller-supplied search radius is outside the accepted range.
    #[error("Invalid search radius {radius_m} m (expected {min} to {max} m)")]
    InvalidRadius {
        /// The rejected radius.
        radius_m: f64,
        /// Smallest accepted radius.
        min: f64,
        /// Largest accepted radius.
        max: f64,
    },

    /// The remote engine finished the query in a non-success state.
    #[error(
        "Remote query {execution_id} {state}: {}",
        .reason.as_deref().unwrap_or("no reason given")
    )]
    RemoteQueryFailed {
        /// Execution handle.
        execution_id: String,
        /// Terminal state (`FAILED` or `CANCELLED`).
        state: QueryState,
        /// Engine-provided reason.
        reason: Option<String>,
    },

    /// The remote query did not finish within the poll timeout.
    #[error("Remote query {execution_id} timed out after {waited:?}")]
    RemoteQueryTimedOut {
        /// Execution handle.
        execution_id: String,
        /// How long the engine waited.
        waited: Duration,
    },

    /// A local dataset could not be loaded.
    #[error("Failed to load {kind} dataset: {source}")]
    DatasetLoad {
        /// Dataset kind.
        kind: FeatureKind,
        /// Underlying load error.
        source: DatasetError,
    },

    /// The remote engine could not be reached or returned garbage.
    #[error("Remote query error: {0}")]
    Remote(#[source] AthenaError),

    /// The active backend has no data for this feature kind.
    #[error("No {kind} dataset is configured for the {backend} backend")]
    DatasetUnavailable {
        /// Requested kind.
        kind: FeatureKind,
        /// Active backend name.
        backend: &'static str,
    },

    /// Startup configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<AthenaError> for ProximityError {
    fn from(e: AthenaError) -> Self {
        match e {
            AthenaError::QueryFailed {
                execution_id,
                state,
                reason,
            } => Self::RemoteQueryFailed {
                execution_id,
                state,
                reason,
            },
            AthenaError::TimedOut {
                execution_id,
                waited,
            } => Self::RemoteQueryTimedOut {
                execution_id,
                waited,
            },
            other => Self::Remote(other),
        }
    }
}
