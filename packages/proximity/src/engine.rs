//! The nearby-feature contract shared by every backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use can_i_park_feature_models::{FeatureKind, NormalizedFeature, QueryRequest};
use serde::{Deserialize, Serialize};

use crate::{
    FeatureSource, ProximityError, normalize::normalize, registry, registry::FieldMapping,
};

/// Radius used by [`ProximityEngine::search_parking`] when none is given.
pub const SEARCH_DEFAULT_RADIUS_M: f64 = 100.0;
/// Result limit per list for [`ProximityEngine::search_parking`].
pub const SEARCH_DEFAULT_TOP_N: usize = 20;
/// Smallest radius [`ProximityEngine::search_parking`] accepts.
pub const SEARCH_MIN_RADIUS_M: f64 = 10.0;
/// Largest radius [`ProximityEngine::search_parking`] accepts.
pub const SEARCH_MAX_RADIUS_M: f64 = 5000.0;

/// Signs and facilities around one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSearch {
    /// Nearby parking signs.
    pub signs: Vec<NormalizedFeature>,
    /// Nearby public garages and lots.
    pub public_parking: Vec<NormalizedFeature>,
}

/// Answers proximity queries against one [`FeatureSource`].
///
/// The engine is immutable and cheap to clone; share it across tasks.
#[derive(Clone)]
pub struct ProximityEngine {
    source: Arc<dyn FeatureSource>,
    fields: BTreeMap<FeatureKind, FieldMapping>,
}

impl std::fmt::Debug for ProximityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityEngine")
            .field("backend", &self.source.backend())
            .field("fields", &self.fields)
            .finish()
    }
}

impl ProximityEngine {
    /// Creates an engine over `source` using the registered field
    /// mappings.
    #[must_use]
    pub fn new(source: Arc<dyn FeatureSource>) -> Self {
        let fields = registry::all_datasets()
            .into_iter()
            .map(|def| (def.kind, def.fields))
            .collect();
        Self { source, fields }
    }

    /// Overrides the field mapping for `kind`.
    #[must_use]
    pub fn with_fields(mut self, kind: FeatureKind, fields: FieldMapping) -> Self {
        self.fields.insert(kind, fields);
        self
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.source.backend()
    }

    /// Finds features of `kind` around `request.point`.
    ///
    /// The result is sorted by ascending `distance_m` (ties keep backend
    /// order), every entry is within `request.radius_meters`, and there
    /// are at most `request.top_n` entries. Rows without usable
    /// coordinates are dropped. A negative or non-finite radius, or a zero
    /// `top_n`, yields an empty result without touching the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError`] if the backend fails or has no data for
    /// `kind`.
    pub async fn find_nearby(
        &self,
        kind: FeatureKind,
        request: QueryRequest,
    ) -> Result<Vec<NormalizedFeature>, ProximityError> {
        if !request.is_satisfiable() {
            log::debug!(
                "Skipping {kind} lookup: radius {} m, top_n {}",
                request.radius_meters,
                request.top_n
            );
            return Ok(Vec::new());
        }

        let raw = self.source.find_nearby(kind, &request).await?;
        let fetched = raw.len();
        let fields = self.fields.get(&kind).cloned().unwrap_or_default();

        let mut features: Vec<NormalizedFeature> = raw
            .into_iter()
            .filter_map(|row| normalize(kind, &fields, row))
            .filter(|f| f.distance_m <= request.radius_meters)
            .collect();
        features.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        features.truncate(request.top_n);

        let level = if request.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(
            level,
            "{kind} lookup on {} backend: {fetched} rows, {} returned",
            self.source.backend(),
            features.len()
        );

        Ok(features)
    }

    /// Parking signs within `radius_m` of (`lat`, `lon`).
    ///
    /// # Errors
    ///
    /// See [`ProximityEngine::find_nearby`]; also fails with
    /// [`ProximityError::InvalidCoordinate`] for malformed coordinates.
    pub async fn find_signs_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<NormalizedFeature>, ProximityError> {
        let request = QueryRequest::new(lat, lon, radius_m, top_n)?.with_debug(debug);
        self.find_nearby(FeatureKind::Sign, request).await
    }

    /// Public garages and lots within `radius_m` of (`lat`, `lon`),
    /// measured to each facility's centroid.
    ///
    /// # Errors
    ///
    /// See [`ProximityEngine::find_signs_nearby`].
    pub async fn find_public_parking_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<NormalizedFeature>, ProximityError> {
        let request = QueryRequest::new(lat, lon, radius_m, top_n)?.with_debug(debug);
        self.find_nearby(FeatureKind::PublicParking, request).await
    }

    /// Street parking segments within `radius_m` of (`lat`, `lon`),
    /// measured to the closest point of each segment.
    ///
    /// # Errors
    ///
    /// See [`ProximityEngine::find_signs_nearby`].
    pub async fn find_street_parking_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        top_n: usize,
        debug: bool,
    ) -> Result<Vec<NormalizedFeature>, ProximityError> {
        let request = QueryRequest::new(lat, lon, radius_m, top_n)?.with_debug(debug);
        self.find_nearby(FeatureKind::StreetParking, request).await
    }

    /// Looks up signs and public parking around a point concurrently.
    ///
    /// `radius_m` defaults to 100 m and must lie in 10..=5000 m when
    /// given; `top_n` defaults to 20.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError::InvalidRadius`] for an out-of-range
    /// radius, otherwise the first error from either lookup.
    pub async fn search_parking(
        &self,
        lat: f64,
        lon: f64,
        radius_m: Option<f64>,
        top_n: Option<usize>,
    ) -> Result<ParkingSearch, ProximityError> {
        let radius_m = radius_m.unwrap_or(SEARCH_DEFAULT_RADIUS_M);
        if !(SEARCH_MIN_RADIUS_M..=SEARCH_MAX_RADIUS_M).contains(&radius_m) {
            return Err(ProximityError::InvalidRadius {
                radius_m,
                min: SEARCH_MIN_RADIUS_M,
                max: SEARCH_MAX_RADIUS_M,
            });
        }
        let request =
            QueryRequest::new(lat, lon, radius_m, top_n.unwrap_or(SEARCH_DEFAULT_TOP_N))?;

        let (signs, public_parking) = tokio::try_join!(
            self.find_nearby(FeatureKind::Sign, request),
            self.find_nearby(FeatureKind::PublicParking, request),
        )?;

        Ok(ParkingSearch {
            signs,
            public_parking,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use can_i_park_athena::{
        AthenaError, ExecutionStatus, GeometryColumns, PollConfig, QueryExecutor, QueryState,
        RemoteTable, ResultPage,
    };
    use can_i_park_spatial::GeometryDataset;

    use super::*;
    use crate::{LocalSource, RemoteSource};

    /// Latitude degrees per ground meter, close enough for fixtures.
    const DEG_PER_M: f64 = 1.0 / 111_320.0;

    const SEATTLE: (f64, f64) = (47.6062, -122.3321);

    fn point_feature(id: usize, lat: f64, lng: f64, category: &str) -> String {
        format!(
            r#"{{ "type": "Feature", "id": {id},
                 "geometry": {{ "type": "Point", "coordinates": [{lng}, {lat}] }},
                 "properties": {{ "CATEGORY": "{category}", "UNITDESC": "Block {id}" }} }}"#
        )
    }

    fn collection(features: &[String]) -> String {
        format!(
            r#"{{ "type": "FeatureCollection", "features": [{}] }}"#,
            features.join(",")
        )
    }

    /// Signs due north of Seattle at the given ground distances.
    fn signs_at(distances_m: &[f64]) -> GeometryDataset {
        let features: Vec<String> = distances_m
            .iter()
            .enumerate()
            .map(|(i, d)| point_feature(i, SEATTLE.0 + d * DEG_PER_M, SEATTLE.1, "PPEAK"))
            .collect();
        GeometryDataset::from_geojson_str(FeatureKind::Sign, &collection(&features)).unwrap()
    }

    fn garages() -> GeometryDataset {
        // A 0.001° square whose first vertex is the query point.
        let (lat, lng) = SEATTLE;
        let text = format!(
            r#"{{ "type": "FeatureCollection", "features": [
                {{ "type": "Feature", "id": "garage-1",
                   "geometry": {{ "type": "Polygon", "coordinates": [[
                       [{lng}, {lat}], [{e}, {lat}], [{e}, {n}], [{lng}, {n}], [{lng}, {lat}]
                   ]] }},
                   "properties": {{ "WEBNAME": "Pike Garage", "DEA_FACILITY_ADDRESS": "1 Pike St" }} }}
            ] }}"#,
            e = lng + 0.001,
            n = lat + 0.001,
        );
        GeometryDataset::from_geojson_str(FeatureKind::PublicParking, &text).unwrap()
    }

    fn streets() -> GeometryDataset {
        // East-west segment passing 30 m north of the query point.
        let (lat, lng) = SEATTLE;
        let n = lat + 30.0 * DEG_PER_M;
        let text = format!(
            r#"{{ "type": "FeatureCollection", "features": [
                {{ "type": "Feature", "id": 9,
                   "geometry": {{ "type": "LineString", "coordinates": [[{w}, {n}], [{e}, {n}]] }},
                   "properties": {{ "UNITDESC": "PIKE ST" }} }}
            ] }}"#,
            w = lng - 0.01,
            e = lng + 0.01,
        );
        GeometryDataset::from_geojson_str(FeatureKind::StreetParking, &text).unwrap()
    }

    fn local_engine(signs: GeometryDataset) -> ProximityEngine {
        let source = LocalSource::new()
            .with_dataset(Arc::new(signs))
            .with_dataset(Arc::new(garages()))
            .with_dataset(Arc::new(streets()));
        ProximityEngine::new(Arc::new(source))
    }

    fn assert_contract(features: &[NormalizedFeature], radius_m: f64, top_n: usize) {
        assert!(features.len() <= top_n, "{} > top_n {top_n}", features.len());
        for f in features {
            assert!(f.distance_m <= radius_m, "{} beyond {radius_m}", f.distance_m);
        }
        for pair in features.windows(2) {
            assert!(pair[0].distance_m <= pair[1].distance_m, "not sorted");
        }
    }

    #[tokio::test]
    async fn exact_match_has_zero_distance() {
        let engine = local_engine(signs_at(&[0.0]));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 10.0, 5, false)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert!(result[0].distance_m < 1e-6);
        assert_eq!(result[0].description.as_deref(), Some("Paid Parking"));
        assert_eq!(result[0].address.as_deref(), Some("Block 0"));
    }

    #[tokio::test]
    async fn radius_excludes_far_features() {
        let engine = local_engine(signs_at(&[150.0, 50.0]));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 5, false)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "1");
        assert!((result[0].distance_m - 50.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn results_are_sorted_bounded_and_in_range() {
        let engine = local_engine(signs_at(&[90.0, 10.0, 400.0, 30.0, 70.0, 50.0, 20.0]));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 4, false)
            .await
            .unwrap();

        assert_contract(&result, 100.0, 4);
        let ids: Vec<&str> = result.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "6", "3", "5"]);
    }

    #[tokio::test]
    async fn top_n_larger_than_matches_returns_all() {
        let engine = local_engine(signs_at(&[10.0, 20.0]));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 50, false)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn zero_radius_without_exact_match_is_empty() {
        let engine = local_engine(signs_at(&[5.0]));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 0.0, 5, false)
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn negative_radius_and_zero_top_n_are_empty() {
        let engine = local_engine(signs_at(&[0.0]));

        assert!(
            engine
                .find_signs_nearby(SEATTLE.0, SEATTLE.1, -5.0, 5, false)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            engine
                .find_signs_nearby(SEATTLE.0, SEATTLE.1, 10.0, 0, false)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected() {
        let engine = local_engine(signs_at(&[0.0]));

        let err = engine
            .find_signs_nearby(90.0001, 0.0, 10.0, 5, false)
            .await
            .unwrap_err();

        assert!(matches!(err, ProximityError::InvalidCoordinate(_)));
    }

    #[tokio::test]
    async fn facility_is_reduced_to_centroid() {
        let engine = local_engine(signs_at(&[0.0]));

        let result = engine
            .find_public_parking_nearby(SEATTLE.0, SEATTLE.1, 200.0, 5, false)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        let garage = &result[0];
        assert!((garage.lat - (SEATTLE.0 + 0.0005)).abs() < 1e-9);
        assert!((garage.lng - (SEATTLE.1 + 0.0005)).abs() < 1e-9);
        assert!(garage.distance_m > 50.0);
        assert_eq!(garage.name.as_deref(), Some("Pike Garage"));
        assert_eq!(garage.address.as_deref(), Some("1 Pike St"));
    }

    #[tokio::test]
    async fn street_segment_uses_closest_point() {
        let engine = local_engine(signs_at(&[0.0]));

        let result = engine
            .find_street_parking_nearby(SEATTLE.0, SEATTLE.1, 40.0, 5, false)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert!((result[0].distance_m - 30.0).abs() < 0.5);
        assert!((result[0].lng - SEATTLE.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn debug_does_not_change_results() {
        let engine = local_engine(signs_at(&[10.0, 20.0, 30.0]));

        let quiet = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 5, false)
            .await
            .unwrap();
        let verbose = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 5, true)
            .await
            .unwrap();

        assert_eq!(quiet, verbose);
    }

    #[tokio::test]
    async fn search_parking_returns_both_lists() {
        let engine = local_engine(signs_at(&[10.0, 20.0]));

        let search = engine
            .search_parking(SEATTLE.0, SEATTLE.1, None, None)
            .await
            .unwrap();

        assert_eq!(search.signs.len(), 2);
        assert_eq!(search.public_parking.len(), 1);
    }

    #[tokio::test]
    async fn search_parking_validates_radius() {
        let engine = local_engine(signs_at(&[10.0]));

        for radius in [9.99, 5000.01, f64::NAN] {
            let err = engine
                .search_parking(SEATTLE.0, SEATTLE.1, Some(radius), None)
                .await
                .unwrap_err();
            assert!(matches!(err, ProximityError::InvalidRadius { .. }));
        }
        assert!(
            engine
                .search_parking(SEATTLE.0, SEATTLE.1, Some(10.0), Some(1))
                .await
                .is_ok()
        );
    }

    // ── Remote backend ──────────────────────────────────────────────

    struct StubExecutor {
        states: Mutex<VecDeque<ExecutionStatus>>,
        page: ResultPage,
        sql: Mutex<Option<String>>,
    }

    impl StubExecutor {
        fn new(states: &[(QueryState, Option<&str>)], page: ResultPage) -> Self {
            Self {
                states: Mutex::new(
                    states
                        .iter()
                        .map(|(state, reason)| ExecutionStatus {
                            state: *state,
                            reason: reason.map(str::to_string),
                        })
                        .collect(),
                ),
                page,
                sql: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryExecutor for StubExecutor {
        async fn start(&self, sql: &str, _database: &str) -> Result<String, AthenaError> {
            *self.sql.lock().unwrap() = Some(sql.to_string());
            Ok("stub-1".to_string())
        }

        async fn status(&self, _execution_id: &str) -> Result<ExecutionStatus, AthenaError> {
            let mut states = self.states.lock().unwrap();
            let status = if states.len() > 1 {
                states.pop_front()
            } else {
                states.front().cloned()
            };
            Ok(status.unwrap())
        }

        async fn fetch(
            &self,
            _execution_id: &str,
            _next_token: Option<&str>,
        ) -> Result<ResultPage, AthenaError> {
            Ok(self.page.clone())
        }

        async fn stop(&self, _execution_id: &str) -> Result<(), AthenaError> {
            Ok(())
        }
    }

    fn sign_table() -> RemoteTable {
        RemoteTable {
            catalog: "AwsDataCatalog".to_string(),
            database: "signs_db".to_string(),
            table: "signs".to_string(),
            geometry: GeometryColumns::LatLng {
                lat_column: "shape_lat".to_string(),
                lng_column: "shape_lng".to_string(),
            },
            numeric_fields: vec!["shape_lat".to_string(), "shape_lng".to_string()],
        }
    }

    fn remote_engine(executor: StubExecutor) -> (ProximityEngine, Arc<StubExecutor>) {
        let executor = Arc::new(executor);
        let poll = PollConfig {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
        };
        let source =
            RemoteSource::new(executor.clone(), poll).with_table(FeatureKind::Sign, sign_table());
        (ProximityEngine::new(Arc::new(source)), executor)
    }

    fn sign_rows(rows: &[[Option<&str>; 5]]) -> ResultPage {
        ResultPage {
            columns: ["objectid", "category", "lat", "lng", "distance_m"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
            next_token: None,
        }
    }

    #[tokio::test]
    async fn remote_failure_surfaces_terminal_state() {
        let (engine, _) = remote_engine(StubExecutor::new(
            &[
                (QueryState::Queued, None),
                (QueryState::Running, None),
                (QueryState::Failed, Some("SYNTAX_ERROR: line 1:1")),
            ],
            ResultPage::default(),
        ));

        let err = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 5, false)
            .await
            .unwrap_err();

        match err {
            ProximityError::RemoteQueryFailed { state, reason, .. } => {
                assert_eq!(state.to_string(), "FAILED");
                assert_eq!(reason.as_deref(), Some("SYNTAX_ERROR: line 1:1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn remote_rows_are_normalized_and_filtered() {
        let (engine, executor) = remote_engine(StubExecutor::new(
            &[(QueryState::Running, None), (QueryState::Succeeded, None)],
            sign_rows(&[
                [Some("3"), Some("PS"), Some("47.6063"), Some("-122.3321"), Some("11.1")],
                [Some("1"), Some("PR"), Some("47.6062"), Some("-122.3321"), Some("0")],
                [Some("2"), Some("GBP"), None, Some("-122.3321"), Some("5")],
                [Some("4"), Some("PTIML"), Some("47.61"), Some("-122.3321"), Some("bogus")],
                [Some("5"), Some("PZONE"), Some("47.6072"), Some("-122.3321"), Some("111.3")],
            ]),
        ));

        let result = engine
            .find_signs_nearby(SEATTLE.0, SEATTLE.1, 100.0, 5, true)
            .await
            .unwrap();

        assert_contract(&result, 100.0, 5);
        let ids: Vec<&str> = result.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(result[0].description.as_deref(), Some("Paid Parking"));
        assert_eq!(result[1].description.as_deref(), Some("General Parking Sign"));

        let sql = executor.sql.lock().unwrap().clone().unwrap();
        assert!(sql.contains("LIMIT 5"));
        assert!(sql.contains("to_spherical_geography"));
    }

    #[tokio::test]
    async fn infinite_radius_is_empty_on_both_backends() {
        let local = local_engine(signs_at(&[10.0, 20.0]));
        let (remote, executor) = remote_engine(StubExecutor::new(
            &[(QueryState::Succeeded, None)],
            sign_rows(&[[Some("1"), Some("PS"), Some("47.6062"), Some("-122.3321"), Some("0")]]),
        ));

        for radius in [f64::INFINITY, f64::NEG_INFINITY] {
            let from_local = local
                .find_signs_nearby(SEATTLE.0, SEATTLE.1, radius, 5, false)
                .await
                .unwrap();
            let from_remote = remote
                .find_signs_nearby(SEATTLE.0, SEATTLE.1, radius, 5, false)
                .await
                .unwrap();

            assert!(from_local.is_empty());
            assert_eq!(from_local, from_remote);
        }
        assert!(executor.sql.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_source_without_table_is_unavailable() {
        let (engine, _) = remote_engine(StubExecutor::new(
            &[(QueryState::Succeeded, None)],
            ResultPage::default(),
        ));

        let err = engine
            .find_street_parking_nearby(SEATTLE.0, SEATTLE.1, 20.0, 5, false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProximityError::DatasetUnavailable {
                kind: FeatureKind::StreetParking,
                backend: "athena"
            }
        ));
    }
}
