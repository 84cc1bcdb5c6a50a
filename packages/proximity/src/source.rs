//! Feature backends behind one capability trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use can_i_park_athena::{
    PollConfig, QueryExecutor, RemoteTable, build_nearby_sql, run_query, to_raw_features,
};
use can_i_park_feature_models::{FeatureKind, QueryRequest, RawFeature};
use can_i_park_spatial::GeometryDataset;

use crate::ProximityError;

/// Log level for the query trace: `debug` requests are promoted to info.
const fn trace_level(request: &QueryRequest) -> log::Level {
    if request.debug {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// A store that can find features of a kind near a point.
///
/// Implementations return rows within `request.radius_meters`, nearest
/// first. The engine still filters, sorts and truncates after
/// normalization, so a backend may over-return.
#[async_trait::async_trait]
pub trait FeatureSource: Send + Sync {
    /// Short backend name for logs and errors.
    fn backend(&self) -> &'static str;

    /// Finds raw features of `kind` near `request.point`.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError`] if the backend has no data for `kind` or
    /// the lookup itself fails.
    async fn find_nearby(
        &self,
        kind: FeatureKind,
        request: &QueryRequest,
    ) -> Result<Vec<RawFeature>, ProximityError>;
}

/// In-memory datasets loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct LocalSource {
    datasets: BTreeMap<FeatureKind, Arc<GeometryDataset>>,
}

impl LocalSource {
    /// Creates a source with no datasets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the dataset for its kind.
    #[must_use]
    pub fn with_dataset(mut self, dataset: Arc<GeometryDataset>) -> Self {
        self.datasets.insert(dataset.kind(), dataset);
        self
    }

    /// Kinds this source can answer.
    pub fn kinds(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        self.datasets.keys().copied()
    }
}

#[async_trait::async_trait]
impl FeatureSource for LocalSource {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn find_nearby(
        &self,
        kind: FeatureKind,
        request: &QueryRequest,
    ) -> Result<Vec<RawFeature>, ProximityError> {
        let dataset = self
            .datasets
            .get(&kind)
            .ok_or(ProximityError::DatasetUnavailable {
                kind,
                backend: self.backend(),
            })?;

        let hits = dataset.query_radius(request.point, request.radius_meters);
        let level = trace_level(request);
        log::log!(
            level,
            "Found {} {kind} features within {} m of ({}, {})",
            hits.len(),
            request.radius_meters,
            request.point.lat,
            request.point.lng
        );
        for hit in hits.iter().take(request.top_n) {
            log::log!(
                level,
                "  {kind} #{} {:?} at {:.2} m",
                hit.index,
                hit.feature.id,
                hit.distance_m
            );
        }

        Ok(hits
            .iter()
            .take(request.top_n)
            .map(can_i_park_spatial::NearbyFeature::to_raw)
            .collect())
    }
}

/// Athena tables queried per request.
#[derive(Clone)]
pub struct RemoteSource {
    executor: Arc<dyn QueryExecutor>,
    tables: BTreeMap<FeatureKind, RemoteTable>,
    poll: PollConfig,
}

impl std::fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSource")
            .field("tables", &self.tables)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl RemoteSource {
    /// Creates a source with no tables.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>, poll: PollConfig) -> Self {
        Self {
            executor,
            tables: BTreeMap::new(),
            poll,
        }
    }

    /// Binds `kind` to an Athena table.
    #[must_use]
    pub fn with_table(mut self, kind: FeatureKind, table: RemoteTable) -> Self {
        self.tables.insert(kind, table);
        self
    }
}

#[async_trait::async_trait]
impl FeatureSource for RemoteSource {
    fn backend(&self) -> &'static str {
        "athena"
    }

    async fn find_nearby(
        &self,
        kind: FeatureKind,
        request: &QueryRequest,
    ) -> Result<Vec<RawFeature>, ProximityError> {
        let table = self
            .tables
            .get(&kind)
            .ok_or(ProximityError::DatasetUnavailable {
                kind,
                backend: self.backend(),
            })?;

        let sql = build_nearby_sql(table, request.point, request.radius_meters, request.top_n);
        let level = trace_level(request);
        log::log!(level, "Athena {kind} query:\n{sql}");

        let result = run_query(self.executor.as_ref(), &sql, &table.database, &self.poll).await?;
        let rows = to_raw_features(&result, table);
        log::log!(level, "Athena returned {} {kind} rows", rows.len());
        for row in &rows {
            log::log!(level, "  {kind} {:?} at {:?} m", row.id, row.distance_m);
        }

        Ok(rows)
    }
}
