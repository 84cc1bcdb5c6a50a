//! Conversion of Athena's string-typed result rows.

use can_i_park_feature_models::{Attributes, RawFeature, attribute, attribute_text};
use serde_json::{Number, Value};

use crate::{RemoteTable, ResultSet};

/// Columns added by [`crate::build_nearby_sql`] and always coerced.
const COMPUTED_NUMERIC: [&str; 3] = ["lat", "lng", "distance_m"];

const ID_COLUMNS: [&str; 3] = ["objectid", "id", "fid"];

/// Converts every row of `result` to an attribute map keyed by column.
///
/// Columns named in `numeric_fields` (case-insensitive) are parsed to
/// `f64`. A value that does not parse, or is not finite, becomes `null`
/// instead of failing the row. All other values stay strings; SQL `NULL`
/// is `null`.
#[must_use]
pub fn parse_rows(result: &ResultSet, numeric_fields: &[String]) -> Vec<Attributes> {
    let numeric: Vec<bool> = result
        .columns
        .iter()
        .map(|column| {
            numeric_fields
                .iter()
                .any(|field| field.eq_ignore_ascii_case(column))
        })
        .collect();

    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .zip(&numeric)
                .enumerate()
                .map(|(i, (column, &is_numeric))| {
                    let value = match row.get(i).and_then(Option::as_deref) {
                        None => Value::Null,
                        Some(text) if is_numeric => parse_number(text),
                        Some(text) => Value::String(text.to_string()),
                    };
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}

fn parse_number(text: &str) -> Value {
    text.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

/// Runs [`parse_rows`] for `table` and lifts the computed columns into
/// [`RawFeature`]s.
///
/// The table's numeric columns are coerced along with `lat`, `lng` and
/// `distance_m`. Those three, plus any raw geometry column, are removed
/// from the passthrough attributes.
#[must_use]
pub fn to_raw_features(result: &ResultSet, table: &RemoteTable) -> Vec<RawFeature> {
    let mut numeric = table.numeric_fields.clone();
    numeric.extend(COMPUTED_NUMERIC.iter().map(ToString::to_string));

    parse_rows(result, &numeric)
        .into_iter()
        .map(|mut attributes| {
            let number = |attributes: &Attributes, name: &str| {
                attribute(attributes, name).and_then(Value::as_f64)
            };
            let lat = number(&attributes, "lat");
            let lng = number(&attributes, "lng");
            let distance_m = number(&attributes, "distance_m");
            let id = ID_COLUMNS
                .iter()
                .find_map(|column| attribute_text(&attributes, column));

            attributes.retain(|key, _| {
                !COMPUTED_NUMERIC
                    .iter()
                    .any(|computed| key.eq_ignore_ascii_case(computed))
                    && table
                        .geometry_column()
                        .is_none_or(|geometry| !key.eq_ignore_ascii_case(geometry))
            });

            RawFeature {
                id,
                lat,
                lng,
                distance_m,
                attributes,
            }
        })
        .collect()
}
