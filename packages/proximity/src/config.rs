//! Startup configuration and engine construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use can_i_park_athena::{AthenaExecutor, PollConfig, RemoteTable};
use can_i_park_feature_models::FeatureKind;
use can_i_park_spatial::{DatasetError, GeometryDataset};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{LocalSource, ProximityEngine, ProximityError, RemoteSource, registry};

const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_CATALOG: &str = "AwsDataCatalog";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which feature store answers queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Backend {
    /// `GeoJSON` datasets loaded into memory.
    #[default]
    Local,
    /// AWS Athena tables queried per request.
    Athena,
}

/// Errors in the startup environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// An environment variable has a value that cannot be used.
    #[error("Invalid value for {name}: {value:?} (expected {expected})")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Rejected value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },
}

/// A local `GeoJSON` dataset to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDataset {
    /// Feature kind.
    pub kind: FeatureKind,
    /// File to read.
    pub path: PathBuf,
    /// Abort startup if the file is missing.
    pub required: bool,
}

/// Athena connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthenaSettings {
    /// AWS region.
    pub region: String,
    /// `s3://` location Athena writes results to.
    pub output_location: String,
    /// Table per queryable kind.
    pub tables: Vec<(FeatureKind, RemoteTable)>,
    /// Poll loop tuning.
    pub poll: PollConfig,
}

/// Everything needed to build a [`ProximityEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityConfig {
    /// Active backend.
    pub backend: Backend,
    /// Local datasets (used by [`Backend::Local`]).
    pub datasets: Vec<LocalDataset>,
    /// Athena settings (present for [`Backend::Athena`]).
    pub athena: Option<AthenaSettings>,
}

impl ProximityConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ProximityConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("PARKING_BACKEND") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PARKING_BACKEND".to_string(),
                value,
                expected: "local or athena",
            })?,
            None => Backend::default(),
        };

        let definitions = registry::all_datasets();

        let datasets = definitions
            .iter()
            .map(|def| LocalDataset {
                kind: def.kind,
                path: lookup(&def.path_env)
                    .map_or_else(|| def.default_path.clone(), PathBuf::from),
                required: def.required || lookup(&def.path_env).is_some(),
            })
            .collect();

        let athena = match backend {
            Backend::Local => None,
            Backend::Athena => {
                let output_location =
                    lookup("AWS_ATHENA_OUTPUT").ok_or_else(|| ConfigError::MissingEnv {
                        name: "AWS_ATHENA_OUTPUT".to_string(),
                    })?;
                let catalog =
                    lookup("AWS_ATHENA_CATALOG").unwrap_or_else(|| DEFAULT_CATALOG.to_string());

                let tables = definitions
                    .iter()
                    .filter_map(|def| {
                        let remote = def.remote.as_ref()?;
                        Some((
                            def.kind,
                            RemoteTable {
                                catalog: catalog.clone(),
                                database: lookup(&remote.database_env)
                                    .unwrap_or_else(|| remote.database.clone()),
                                table: lookup(&remote.table_env)
                                    .unwrap_or_else(|| remote.table.clone()),
                                geometry: remote.geometry.clone(),
                                numeric_fields: remote.numeric_fields.clone(),
                            },
                        ))
                    })
                    .collect();

                let interval_ms =
                    parse_u64(&lookup, "ATHENA_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS, 1)?;
                let timeout_secs =
                    parse_u64(&lookup, "ATHENA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS, 0)?;

                Some(AthenaSettings {
                    region: lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                    output_location,
                    tables,
                    poll: PollConfig {
                        interval: Duration::from_millis(interval_ms),
                        timeout: (timeout_secs > 0).then_some(Duration::from_secs(timeout_secs)),
                    },
                })
            }
        };

        Ok(Self {
            backend,
            datasets,
            athena,
        })
    }
}

/// Reads an integer variable that must be at least `min` (0 or 1).
fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
) -> Result<u64, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed >= min => Ok(parsed),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
            expected: if min > 0 {
                "a positive integer"
            } else {
                "a non-negative integer"
            },
        }),
    }
}

/// Builds the engine for `config`.
///
/// For the local backend every dataset is loaded up front; a required
/// dataset that fails to load aborts with
/// [`ProximityError::DatasetLoad`]. Optional datasets whose file does not
/// exist are skipped, and queries for that kind then fail with
/// [`ProximityError::DatasetUnavailable`].
///
/// # Errors
///
/// Returns [`ProximityError`] if a dataset cannot be loaded or the Athena
/// settings are missing.
pub async fn build_engine(config: &ProximityConfig) -> Result<ProximityEngine, ProximityError> {
    match config.backend {
        Backend::Local => {
            let mut source = LocalSource::new();
            for dataset in &config.datasets {
                match GeometryDataset::load(dataset.kind, &dataset.path) {
                    Ok(loaded) => source = source.with_dataset(Arc::new(loaded)),
                    Err(DatasetError::Io { path, source: e })
                        if !dataset.required && e.kind() == std::io::ErrorKind::NotFound =>
                    {
                        log::warn!(
                            "Optional {} dataset not found at {path}, skipping",
                            dataset.kind
                        );
                    }
                    Err(source) => {
                        return Err(ProximityError::DatasetLoad {
                            kind: dataset.kind,
                            source,
                        });
                    }
                }
            }
            log::info!(
                "Local backend ready with {} datasets",
                source.kinds().count()
            );
            Ok(ProximityEngine::new(Arc::new(source)))
        }
        Backend::Athena => {
            let settings = config.athena.as_ref().ok_or_else(|| ConfigError::MissingEnv {
                name: "AWS_ATHENA_OUTPUT".to_string(),
            })?;
            let executor =
                AthenaExecutor::new(settings.output_location.clone(), Some(settings.region.clone()))
                    .await;

            let mut source = RemoteSource::new(Arc::new(executor), settings.poll);
            for (kind, table) in &settings.tables {
                log::info!("Athena {kind} table: {}", table.qualified_name());
                source = source.with_table(*kind, table.clone());
            }
            Ok(ProximityEngine::new(Arc::new(source)))
        }
    }
}
