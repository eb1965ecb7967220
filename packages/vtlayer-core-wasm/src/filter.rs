use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geojson_features::GeoFeature;

/// One user-defined filter, scoped to a data source.
///
/// Accepted as `{dataSourceId, propertyName, type, value}`; the kepler-style
/// `dataId` and `name` keys are aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterSpecRepr", into = "FilterSpecRepr")]
pub struct FilterSpec {
    pub data_source_id: String,
    pub property_name: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exclusive bounds: passes iff `min < value < max`.
    Range(f64, f64),
    /// Loose equality, so `"90"` matches `90`.
    Select(Value),
    /// Strict membership in the set.
    MultiSelect(Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Range,
    Select,
    MultiSelect,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterSpecRepr {
    #[serde(alias = "dataId")]
    data_source_id: String,
    #[serde(alias = "name")]
    property_name: String,
    #[serde(rename = "type", alias = "kind")]
    kind: FilterKind,
    value: Value,
}

impl TryFrom<FilterSpecRepr> for FilterSpec {
    type Error = String;

    fn try_from(repr: FilterSpecRepr) -> Result<Self, Self::Error> {
        let predicate = match (repr.kind, repr.value) {
            (FilterKind::Range, Value::Array(bounds)) if bounds.len() == 2 => {
                match (as_number(&bounds[0]), as_number(&bounds[1])) {
                    (Some(min), Some(max)) => Predicate::Range(min, max),
                    _ => {
                        return Err(format!(
                            "range bounds for '{}' must be numeric",
                            repr.property_name
                        ))
                    }
                }
            }
            (FilterKind::Range, _) => {
                return Err(format!("range filter on '{}' needs [min, max]", repr.property_name))
            }
            (FilterKind::Select, value) => Predicate::Select(value),
            (FilterKind::MultiSelect, Value::Array(members)) => Predicate::MultiSelect(members),
            // a lone scalar is a one-member set
            (FilterKind::MultiSelect, value) => Predicate::MultiSelect(vec![value]),
        };
        Ok(FilterSpec {
            data_source_id: repr.data_source_id,
            property_name: repr.property_name,
            predicate,
        })
    }
}

impl From<FilterSpec> for FilterSpecRepr {
    fn from(spec: FilterSpec) -> Self {
        let kind = spec.kind();
        let value = match spec.predicate {
            Predicate::Range(min, max) => serde_json::json!([min, max]),
            Predicate::Select(value) => value,
            Predicate::MultiSelect(members) => Value::Array(members),
        };
        FilterSpecRepr {
            data_source_id: spec.data_source_id,
            property_name: spec.property_name,
            kind,
            value,
        }
    }
}

impl FilterSpec {
    pub fn range(data_source_id: &str, property_name: &str, min: f64, max: f64) -> Self {
        Self::new(data_source_id, property_name, Predicate::Range(min, max))
    }

    pub fn select(data_source_id: &str, property_name: &str, value: Value) -> Self {
        Self::new(data_source_id, property_name, Predicate::Select(value))
    }

    pub fn multi_select(data_source_id: &str, property_name: &str, values: Vec<Value>) -> Self {
        Self::new(data_source_id, property_name, Predicate::MultiSelect(values))
    }

    pub fn kind(&self) -> FilterKind {
        match self.predicate {
            Predicate::Range(..) => FilterKind::Range,
            Predicate::Select(_) => FilterKind::Select,
            Predicate::MultiSelect(_) => FilterKind::MultiSelect,
        }
    }

    fn new(data_source_id: &str, property_name: &str, predicate: Predicate) -> Self {
        Self {
            data_source_id: data_source_id.to_string(),
            property_name: property_name.to_string(),
            predicate,
        }
    }
}

impl Predicate {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Range(min, max) => {
                as_number(value).map_or(false, |x| *min < x && x < *max)
            }
            Predicate::Select(expected) => loose_eq(value, expected),
            Predicate::MultiSelect(members) => members.iter().any(|m| strict_eq(value, m)),
        }
    }
}

/// Whether `feature` passes every spec targeting `data_source_id`.
///
/// Specs for other data sources are ignored and a spec naming a property the
/// feature lacks does not apply; tiles routinely carry partial schemas.
pub fn passes_filters(feature: &GeoFeature, data_source_id: &str, specs: &[FilterSpec]) -> bool {
    specs
        .iter()
        .filter(|spec| spec.data_source_id == data_source_id)
        .all(|spec| match feature.properties.get(&spec.property_name) {
            Some(value) => spec.predicate.matches(value),
            None => true,
        })
}

pub fn filter_features(
    features: &[GeoFeature],
    data_source_id: &str,
    specs: &[FilterSpec],
) -> Vec<GeoFeature> {
    if !specs.iter().any(|s| s.data_source_id == data_source_id) {
        return features.to_vec();
    }
    features
        .par_iter()
        .filter(|feature| passes_filters(feature, data_source_id, specs))
        .cloned()
        .collect()
}

/// Read a property value as a finite number. Numeric strings and booleans
/// coerce; null, empty strings, nested values and "NaN"/"inf" do not.
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.filter(|x: &f64| x.is_finite())
}

/// Same type and same value; numbers compare by value so `50` equals `50.0`.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Equality tolerating mixed scalar types: anything compared against a
/// number or boolean is compared numerically.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            strict_eq(a, b)
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geojson_features::{GeometryType, Properties};
    use geo_types::{point, Geometry};
    use serde_json::json;

    fn feature(props: Value) -> GeoFeature {
        let properties: Properties = serde_json::from_value(props).unwrap();
        GeoFeature {
            id: None,
            layer: "default".to_string(),
            geometry_type: GeometryType::Point,
            geometry: Geometry::Point(point!(x: 0.0, y: 0.0)),
            properties,
        }
    }

    #[test]
    fn no_specs_for_source_passes_everything() {
        let f = feature(json!({"Population": 1}));
        assert!(passes_filters(&f, "ds1", &[]));
        assert!(passes_filters(&f, "ds1", &[FilterSpec::range("other", "Population", 5.0, 9.0)]));
    }

    #[test]
    fn range_bounds_are_exclusive() {
        let spec = [FilterSpec::range("ds1", "Population", 90.0, 630.0)];
        assert!(passes_filters(&feature(json!({"Population": 500})), "ds1", &spec));
        assert!(passes_filters(&feature(json!({"Population": 90.5})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"Population": 90})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"Population": 630})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"Population": 50})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"Population": "many"})), "ds1", &spec));
    }

    #[test]
    fn missing_property_does_not_reject() {
        let spec = [FilterSpec::select("ds1", "kind", json!("park"))];
        assert!(passes_filters(&feature(json!({"other": 1})), "ds1", &spec));
    }

    #[test]
    fn select_uses_loose_equality() {
        let spec = [FilterSpec::select("ds1", "code", json!(90))];
        assert!(passes_filters(&feature(json!({"code": "90"})), "ds1", &spec));
        assert!(passes_filters(&feature(json!({"code": 90.0})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"code": "91"})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"code": null})), "ds1", &spec));
    }

    #[test]
    fn multi_select_checks_every_member_strictly() {
        let spec = [FilterSpec::multi_select(
            "ds1",
            "kind",
            vec![json!("park"), json!("school"), json!(3)],
        )];
        assert!(passes_filters(&feature(json!({"kind": "school"})), "ds1", &spec));
        assert!(passes_filters(&feature(json!({"kind": 3.0})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"kind": "3"})), "ds1", &spec));
        assert!(!passes_filters(&feature(json!({"kind": "road"})), "ds1", &spec));
    }

    #[test]
    fn specs_on_one_source_are_and_combined() {
        let both = vec![
            FilterSpec::range("ds1", "a", 0.0, 10.0),
            FilterSpec::range("ds1", "b", 100.0, 200.0),
        ];
        let features: Vec<GeoFeature> = [(5, 150), (5, 250), (15, 150), (15, 250), (1, 101)]
            .iter()
            .map(|(a, b)| feature(json!({"a": a, "b": b})))
            .collect();

        let passing = filter_features(&features, "ds1", &both);
        assert_eq!(passing, vec![features[0].clone(), features[4].clone()]);

        // dropping either spec can only admit a superset
        for keep in 0..2 {
            let single = vec![both[keep].clone()];
            let wider = filter_features(&features, "ds1", &single);
            assert!(passing.iter().all(|f| wider.contains(f)));
            assert!(wider.len() >= passing.len());
        }
    }

    #[test]
    fn non_finite_strings_are_not_numbers() {
        for text in ["NaN", "inf", "-infinity", "Infinity"] {
            assert_eq!(as_number(&json!(text)), None);
        }
        assert_eq!(as_number(&json!(" 12.5 ")), Some(12.5));

        let spec = [FilterSpec::range("ds1", "Population", f64::MIN, f64::MAX)];
        assert!(!passes_filters(&feature(json!({"Population": "inf"})), "ds1", &spec));
    }

    #[test]
    fn specs_deserialize_from_layer_config_json() {
        let specs: Vec<FilterSpec> = serde_json::from_value(json!([
            {"dataId": "ds1", "name": "Population", "type": "range", "value": [90, 630]},
            {"dataSourceId": "ds1", "propertyName": "kind", "type": "multiSelect", "value": ["a", "b"]},
            {"dataSourceId": "ds1", "propertyName": "code", "type": "select", "value": 50}
        ]))
        .unwrap();

        assert_eq!(specs[0], FilterSpec::range("ds1", "Population", 90.0, 630.0));
        assert_eq!(specs[1], FilterSpec::multi_select("ds1", "kind", vec![json!("a"), json!("b")]));
        assert_eq!(specs[2], FilterSpec::select("ds1", "code", json!(50)));

        let bad: Result<FilterSpec, _> = serde_json::from_value(json!(
            {"dataId": "ds1", "name": "Population", "type": "range", "value": 5}
        ));
        assert!(bad.is_err());
    }
}
