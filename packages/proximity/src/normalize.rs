//! Maps backend rows onto [`NormalizedFeature`].

use can_i_park_feature_models::{
    FeatureKind, NormalizedFeature, RawFeature, SignCategory, validate,
};

use crate::registry::FieldMapping;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Google Maps search link for a coordinate.
#[must_use]
pub fn maps_url(lat: f64, lng: f64) -> String {
    format!("{MAPS_SEARCH_URL}{lat},{lng}")
}

/// Normalizes one backend row.
///
/// Returns `None`, and logs why, when the row has no usable coordinates or
/// distance. Sign category codes are looked up in the sign code table for
/// the description; unknown codes, and categories of other kinds, keep the
/// code and leave the description empty.
#[must_use]
pub fn normalize(
    kind: FeatureKind,
    fields: &FieldMapping,
    raw: RawFeature,
) -> Option<NormalizedFeature> {
    let (Some(lat), Some(lng)) = (raw.lat, raw.lng) else {
        log::warn!("Dropping {kind} row {:?}: missing coordinates", raw.id);
        return None;
    };
    let point = match validate(lat, lng) {
        Ok(point) => point,
        Err(e) => {
            log::warn!("Dropping {kind} row {:?}: {e}", raw.id);
            return None;
        }
    };
    let Some(distance_m) = raw.distance_m.filter(|d| d.is_finite()) else {
        log::warn!("Dropping {kind} row {:?}: missing distance", raw.id);
        return None;
    };

    let attributes = raw.attributes;
    let category = FieldMapping::first(&fields.category, &attributes);
    let description = match kind {
        FeatureKind::Sign => category
            .as_deref()
            .and_then(SignCategory::from_code)
            .map(|c| c.description().to_string()),
        FeatureKind::PublicParking | FeatureKind::StreetParking => None,
    };
    let id = raw
        .id
        .unwrap_or_else(|| format!("{kind}:{:.6},{:.6}", point.lat, point.lng));

    Some(NormalizedFeature {
        id,
        kind,
        lat: point.lat,
        lng: point.lng,
        distance_m,
        category,
        description,
        name: FieldMapping::first(&fields.name, &attributes),
        address: FieldMapping::first(&fields.address, &attributes),
        text: FieldMapping::first(&fields.text, &attributes),
        maps_url: maps_url(point.lat, point.lng),
        attributes,
    })
}
