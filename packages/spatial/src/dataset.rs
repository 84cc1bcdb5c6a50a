//! Dataset storage and radius queries.

use std::collections::BTreeMap;
use std::path::Path;

use can_i_park_feature_models::{
    Attributes, FeatureKind, GeoPoint, MercatorPoint, RawFeature, attribute_text,
    coordinate::{WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_RADIUS_M},
};
use geo::{BoundingRect, Centroid, Closest, ClosestPoint};
use geojson::{GeoJson, feature::Id};
use rstar::{AABB, RTree, RTreeObject};

use crate::{DatasetError, source_crs, to_mercator, to_wgs84};

/// Ground meters per degree of latitude on the EPSG:3857 sphere.
const METERS_PER_DEGREE: f64 = WEB_MERCATOR_RADIUS_M * std::f64::consts::PI / 180.0;

/// Easting of the antimeridian.
const HALF_WORLD_WIDTH_M: f64 = WEB_MERCATOR_RADIUS_M * std::f64::consts::PI;

/// Properties checked, in order, for an identifier when the `GeoJSON`
/// feature has no `id` member.
const ID_PROPERTIES: &[&str] = &["OBJECTID", "id", "FID"];

/// A canonical (WGS84) feature.
#[derive(Debug, Clone)]
pub struct DatasetFeature {
    /// Identifier from the source, if any.
    pub id: Option<String>,
    /// Geometry in WGS84 (`x` = longitude, `y` = latitude).
    pub geometry: geo::Geometry<f64>,
    /// Source properties.
    pub attributes: Attributes,
}

/// How a feature is reduced to a single point for distance math.
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Points, and centroids of areal geometries.
    Fixed {
        projected: MercatorPoint,
        geographic: GeoPoint,
    },
    /// Line work: the point on the geometry closest to the query.
    Nearest,
}

/// Web Mercator counterpart of the feature at the same index.
#[derive(Debug, Clone)]
struct ProjectedFeature {
    geometry: geo::Geometry<f64>,
    anchor: Anchor,
}

impl ProjectedFeature {
    /// Representative point relative to `query`, projected and geographic.
    fn anchor_for(&self, query: MercatorPoint) -> Option<(MercatorPoint, GeoPoint)> {
        match self.anchor {
            Anchor::Fixed {
                projected,
                geographic,
            } => Some((projected, geographic)),
            Anchor::Nearest => {
                let target = geo::Point::new(query.x, query.y);
                match self.geometry.closest_point(&target) {
                    Closest::Intersection(p) | Closest::SinglePoint(p) => {
                        let projected = MercatorPoint::new(p.x(), p.y());
                        Some((projected, projected.to_geographic()))
                    }
                    Closest::Indeterminate => None,
                }
            }
        }
    }
}

/// R-tree entry pointing back into the dataset by index.
struct IndexEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A feature matched by a radius query.
#[derive(Debug, Clone, Copy)]
pub struct NearbyFeature<'a> {
    /// Position of the feature in the dataset.
    pub index: usize,
    /// The matched feature.
    pub feature: &'a DatasetFeature,
    /// Representative point in WGS84.
    pub point: GeoPoint,
    /// Ground distance from the query point in meters.
    pub distance_m: f64,
}

impl NearbyFeature<'_> {
    /// Copies this match into a backend-neutral [`RawFeature`].
    #[must_use]
    pub fn to_raw(&self) -> RawFeature {
        RawFeature {
            id: self.feature.id.clone(),
            lat: Some(self.point.lat),
            lng: Some(self.point.lng),
            distance_m: Some(self.distance_m),
            attributes: self.feature.attributes.clone(),
        }
    }
}

/// An immutable, indexed collection of features of one kind.
///
/// `features[i]` and its projected copy always describe the same source
/// row; loading never reorders rows and drops only rows without usable
/// geometry.
pub struct GeometryDataset {
    kind: FeatureKind,
    features: Vec<DatasetFeature>,
    projected: Vec<ProjectedFeature>,
    index: RTree<IndexEntry>,
}

impl std::fmt::Debug for GeometryDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryDataset")
            .field("kind", &self.kind)
            .field("features", &self.features.len())
            .finish_non_exhaustive()
    }
}

impl GeometryDataset {
    /// Loads a `GeoJSON` `FeatureCollection` from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the file cannot be read, is not a
    /// `FeatureCollection`, declares an unsupported CRS, or contains no
    /// usable features.
    pub fn load(kind: FeatureKind, path: &Path) -> Result<Self, DatasetError> {
        log::info!("Loading {kind} dataset from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_geojson_str(kind, &text)
    }

    /// Parses a `GeoJSON` `FeatureCollection` held in memory.
    ///
    /// # Errors
    ///
    /// See [`GeometryDataset::load`].
    pub fn from_geojson_str(kind: FeatureKind, text: &str) -> Result<Self, DatasetError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(DatasetError::NotFeatureCollection);
        };
        let crs = source_crs(collection.foreign_members.as_ref())?;
        let total = collection.features.len();

        let mut features = Vec::with_capacity(total);
        for (row, feature) in collection.features.into_iter().enumerate() {
            let attributes = feature.properties.unwrap_or_default();
            let id = feature
                .id
                .map(|id| match id {
                    Id::String(s) => s,
                    Id::Number(n) => n.to_string(),
                })
                .or_else(|| {
                    ID_PROPERTIES
                        .iter()
                        .find_map(|name| attribute_text(&attributes, name))
                });

            let Some(geometry) = feature.geometry.and_then(|g| to_wgs84(g, crs)) else {
                log::warn!("Skipping {kind} row {row} ({id:?}): missing or unsupported geometry");
                continue;
            };

            features.push(DatasetFeature {
                id,
                geometry,
                attributes,
            });
        }

        let dataset = Self::from_features(kind, features);
        if dataset.is_empty() {
            return Err(DatasetError::Empty { total });
        }
        log::info!(
            "Loaded {} of {total} {kind} features (source CRS {crs})",
            dataset.len()
        );
        Ok(dataset)
    }

    /// Builds a dataset from WGS84 features.
    ///
    /// Features whose representative point is not a valid coordinate are
    /// skipped.
    #[must_use]
    pub fn from_features(kind: FeatureKind, features: Vec<DatasetFeature>) -> Self {
        let mut kept = Vec::with_capacity(features.len());
        let mut projected = Vec::with_capacity(features.len());
        let mut entries = Vec::with_capacity(features.len());

        for feature in features {
            let Some(anchor) = anchor_of(&feature.geometry) else {
                log::warn!(
                    "Skipping {kind} feature {:?}: no valid representative point",
                    feature.id
                );
                continue;
            };
            let geometry = to_mercator(&feature.geometry);
            let Some(rect) = geometry.bounding_rect() else {
                continue;
            };

            entries.push(IndexEntry {
                index: kept.len(),
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
            projected.push(ProjectedFeature { geometry, anchor });
            kept.push(feature);
        }

        Self {
            kind,
            features: kept,
            projected,
            index: RTree::bulk_load(entries),
        }
    }

    /// Which kind of feature this dataset holds.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the dataset holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Canonical WGS84 features in source order.
    #[must_use]
    pub fn features(&self) -> &[DatasetFeature] {
        &self.features
    }

    /// Finds every feature within `radius_m` ground meters of `point`.
    ///
    /// Results are sorted by ascending distance; ties keep dataset order.
    /// A negative or NaN radius matches nothing, a zero radius matches
    /// only features exactly at `point`. Searches that reach past ±180°
    /// also look at the other side of the antimeridian.
    #[must_use]
    pub fn query_radius(&self, point: GeoPoint, radius_m: f64) -> Vec<NearbyFeature<'_>> {
        if radius_m.is_nan() || radius_m < 0.0 {
            return Vec::new();
        }

        let center = point.to_mercator();
        let mut nearest: BTreeMap<usize, NearbyFeature<'_>> = BTreeMap::new();

        for shifted in wrapped_centers(point, center, radius_m) {
            let search = search_envelope(point, shifted, radius_m);
            for entry in self.index.locate_in_envelope_intersecting(&search) {
                let Some((projected, geographic)) =
                    self.projected[entry.index].anchor_for(shifted)
                else {
                    continue;
                };
                let distance_m = shifted.ground_distance(projected);
                log::trace!(
                    "{} candidate {} at {distance_m:.2} m",
                    self.kind,
                    entry.index
                );
                if distance_m > radius_m
                    || nearest
                        .get(&entry.index)
                        .is_some_and(|hit| hit.distance_m <= distance_m)
                {
                    continue;
                }
                nearest.insert(
                    entry.index,
                    NearbyFeature {
                        index: entry.index,
                        feature: &self.features[entry.index],
                        point: geographic,
                        distance_m,
                    },
                );
            }
        }

        let mut hits: Vec<NearbyFeature<'_>> = nearest.into_values().collect();
        hits.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.index.cmp(&b.index))
        });
        hits
    }
}

/// Computes the fixed anchor for areal/point geometries, or marks line
/// work as nearest-point anchored.
///
/// Centroids are taken in WGS84, matching `ST_Centroid` on the remote
/// engine, then projected.
fn anchor_of(geometry: &geo::Geometry<f64>) -> Option<Anchor> {
    match geometry {
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) | geo::Geometry::MultiLineString(_) => {
            Some(Anchor::Nearest)
        }
        _ => {
            let c = geometry.centroid()?;
            let geographic = GeoPoint::new(c.y(), c.x()).ok()?;
            Some(Anchor::Fixed {
                projected: geographic.to_mercator(),
                geographic,
            })
        }
    }
}

/// The query center plus its copies one world width east or west when the
/// search box crosses the antimeridian.
fn wrapped_centers(point: GeoPoint, center: MercatorPoint, radius_m: f64) -> Vec<MercatorPoint> {
    let search = search_envelope(point, center, radius_m);
    let mut centers = vec![center];
    if search.lower()[0] < -HALF_WORLD_WIDTH_M {
        centers.push(MercatorPoint::new(center.x + 2.0 * HALF_WORLD_WIDTH_M, center.y));
    }
    if search.upper()[0] > HALF_WORLD_WIDTH_M {
        centers.push(MercatorPoint::new(center.x - 2.0 * HALF_WORLD_WIDTH_M, center.y));
    }
    centers
}

/// Projected search box guaranteed to contain every point within
/// `radius_m` ground meters.
///
/// The Mercator scale factor shrinks toward the poles, so the box is sized
/// with the scale at the most poleward latitude the radius can reach.
fn search_envelope(point: GeoPoint, center: MercatorPoint, radius_m: f64) -> AABB<[f64; 2]> {
    let poleward =
        (point.lat.abs() + radius_m / METERS_PER_DEGREE).min(WEB_MERCATOR_MAX_LATITUDE);
    let reach = radius_m / poleward.to_radians().cos() + 1e-6;
    AABB::from_corners(
        [center.x - reach, center.y - reach],
        [center.x + reach, center.y + reach],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEATTLE: GeoPoint = GeoPoint {
        lat: 47.6062,
        lng: -122.3321,
    };

    /// Moves a point north by `meters` of ground distance.
    fn north_of(p: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: p.lat + meters / METERS_PER_DEGREE,
            lng: p.lng,
        }
    }

    fn point_feature(id: &str, p: GeoPoint) -> String {
        format!(
            r#"{{"type":"Feature","id":"{id}","properties":{{"CATEGORY":"PPEAK"}},
                "geometry":{{"type":"Point","coordinates":[{},{}]}}}}"#,
            p.lng, p.lat
        )
    }

    fn collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    fn ids(hits: &[NearbyFeature<'_>]) -> Vec<String> {
        hits.iter()
            .map(|h| h.feature.id.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn exact_match_has_zero_distance() {
        let text = collection(&[point_feature("a", SEATTLE)]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let hits = dataset.query_radius(SEATTLE, 10.0);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance_m.abs() < 1e-6);
        assert!((hits[0].point.lat - SEATTLE.lat).abs() < 1e-12);
        assert!((hits[0].point.lng - SEATTLE.lng).abs() < 1e-12);
    }

    #[test]
    fn radius_excludes_far_features() {
        let text = collection(&[
            point_feature("far", north_of(SEATTLE, 150.0)),
            point_feature("near", north_of(SEATTLE, 50.0)),
        ]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let hits = dataset.query_radius(SEATTLE, 100.0);
        assert_eq!(ids(&hits), vec!["near"]);
        assert!((hits[0].distance_m - 50.0).abs() < 0.1);
    }

    #[test]
    fn results_sorted_with_stable_ties() {
        let text = collection(&[
            point_feature("c", north_of(SEATTLE, 80.0)),
            point_feature("a", north_of(SEATTLE, 20.0)),
            point_feature("b", north_of(SEATTLE, 20.0)),
            point_feature("d", north_of(SEATTLE, 5.0)),
        ]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let hits = dataset.query_radius(SEATTLE, 500.0);
        assert_eq!(ids(&hits), vec!["d", "a", "b", "c"]);
        for pair in hits.windows(2) {
            assert!(pair[0].distance_m <= pair[1].distance_m);
        }
        for hit in &hits {
            assert!(hit.distance_m <= 500.0);
        }
    }

    #[test]
    fn zero_and_negative_radius() {
        let text = collection(&[point_feature("a", north_of(SEATTLE, 1.0))]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        assert!(dataset.query_radius(SEATTLE, 0.0).is_empty());
        assert!(dataset.query_radius(SEATTLE, -5.0).is_empty());
        assert!(dataset.query_radius(SEATTLE, f64::NAN).is_empty());

        let at_point = collection(&[point_feature("a", SEATTLE)]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &at_point).unwrap();
        assert_eq!(dataset.query_radius(SEATTLE, 0.0).len(), 1);
    }

    #[test]
    fn finds_features_across_antimeridian() {
        let query = GeoPoint {
            lat: -16.5,
            lng: 179.9995,
        };
        let text = collection(&[
            point_feature("east", GeoPoint { lat: -16.5, lng: -179.9995 }),
            point_feature("west", GeoPoint { lat: -16.5, lng: 179.999 }),
            point_feature("far", GeoPoint { lat: -16.5, lng: -179.99 }),
        ]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let hits = dataset.query_radius(query, 150.0);

        assert_eq!(ids(&hits), vec!["west", "east"]);
        // 0.001° of longitude at 16.5°S, once either way.
        let expected = 0.001 * METERS_PER_DEGREE * query.lat.to_radians().cos();
        assert!((hits[1].distance_m - expected).abs() < 0.5, "{}", hits[1].distance_m);
        assert!((hits[0].distance_m - expected / 2.0).abs() < 0.5);
        assert!((hits[1].point.lng - -179.9995).abs() < 1e-9);
    }

    #[test]
    fn polygon_reduced_to_centroid() {
        let text = r#"{"type":"FeatureCollection","features":[{
            "type":"Feature","properties":{"OBJECTID":7,"FAC_NAME":"Garage"},
            "geometry":{"type":"Polygon","coordinates":[[
                [-122.3330,47.6050],[-122.3310,47.6050],[-122.3310,47.6070],
                [-122.3330,47.6070],[-122.3330,47.6050]]]}}]}"#;
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::PublicParking, text).unwrap();

        let hits = dataset.query_radius(SEATTLE, 1_000.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point.lat - 47.6060).abs() < 1e-9);
        assert!((hits[0].point.lng - -122.3320).abs() < 1e-9);
        assert_eq!(hits[0].feature.id.as_deref(), Some("7"));
    }

    #[test]
    fn line_uses_closest_point() {
        // East-west segment 40 m north of the query point.
        let north = north_of(SEATTLE, 40.0);
        let text = format!(
            r#"{{"type":"FeatureCollection","features":[{{
                "type":"Feature","properties":{{}},
                "geometry":{{"type":"LineString","coordinates":[[{},{}],[{},{}]]}}}}]}}"#,
            SEATTLE.lng - 0.01,
            north.lat,
            SEATTLE.lng + 0.01,
            north.lat
        );
        let dataset =
            GeometryDataset::from_geojson_str(FeatureKind::StreetParking, &text).unwrap();

        let hits = dataset.query_radius(SEATTLE, 50.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance_m - 40.0).abs() < 0.1);
        assert!((hits[0].point.lng - SEATTLE.lng).abs() < 1e-7);
        assert!(dataset.query_radius(SEATTLE, 30.0).is_empty());
    }

    #[test]
    fn mercator_source_is_reprojected() {
        let projected = SEATTLE.to_mercator();
        let text = format!(
            r#"{{"type":"FeatureCollection",
                "crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::3857"}}}},
                "features":[{{"type":"Feature","properties":{{}},
                "geometry":{{"type":"Point","coordinates":[{},{}]}}}}]}}"#,
            projected.x, projected.y
        );
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let geo::Geometry::Point(p) = &dataset.features()[0].geometry else {
            panic!("expected a point");
        };
        assert!((p.y() - SEATTLE.lat).abs() < 1e-9);
        assert!((p.x() - SEATTLE.lng).abs() < 1e-9);
        assert_eq!(dataset.query_radius(SEATTLE, 1.0).len(), 1);
    }

    #[test]
    fn projected_copy_matches_canonical_rows() {
        let text = collection(&[
            point_feature("a", north_of(SEATTLE, 10.0)),
            r#"{"type":"Feature","properties":{},"geometry":null}"#.to_string(),
            point_feature("b", north_of(SEATTLE, 20.0)),
        ]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.projected.len(), dataset.features.len());
        for (feature, projected) in dataset.features.iter().zip(&dataset.projected) {
            let (geo::Geometry::Point(wgs), geo::Geometry::Point(merc)) =
                (&feature.geometry, &projected.geometry)
            else {
                panic!("expected points");
            };
            let back = MercatorPoint::new(merc.x(), merc.y()).to_geographic();
            assert!((back.lat - wgs.y()).abs() < 1e-9);
            assert!((back.lng - wgs.x()).abs() < 1e-9);
        }
    }

    #[test]
    fn load_failures() {
        assert!(matches!(
            GeometryDataset::load(FeatureKind::Sign, Path::new("does/not/exist.geojson")),
            Err(DatasetError::Io { .. })
        ));
        assert!(matches!(
            GeometryDataset::from_geojson_str(FeatureKind::Sign, "{not json"),
            Err(DatasetError::Parse(_))
        ));
        assert!(matches!(
            GeometryDataset::from_geojson_str(
                FeatureKind::Sign,
                r#"{"type":"Point","coordinates":[0,0]}"#
            ),
            Err(DatasetError::NotFeatureCollection)
        ));
        assert!(matches!(
            GeometryDataset::from_geojson_str(
                FeatureKind::Sign,
                r#"{"type":"FeatureCollection","features":[]}"#
            ),
            Err(DatasetError::Empty { total: 0 })
        ));
    }

    #[test]
    fn to_raw_carries_distance_and_attributes() {
        let text = collection(&[point_feature("a", north_of(SEATTLE, 30.0))]);
        let dataset = GeometryDataset::from_geojson_str(FeatureKind::Sign, &text).unwrap();

        let raw = dataset.query_radius(SEATTLE, 100.0)[0].to_raw();
        assert_eq!(raw.id.as_deref(), Some("a"));
        assert!((raw.distance_m.unwrap() - 30.0).abs() < 0.1);
        assert_eq!(raw.attributes["CATEGORY"], "PPEAK");
    }
}
