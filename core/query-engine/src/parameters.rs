//! FILENAME: core/query-engine/src/parameters.rs
//! PURPOSE: Report parameter definitions and the validator that binds
//! caller-supplied values to them.
//! CONTEXT: Runs before any query is assembled. Every value that reaches
//! the assembler has been coerced to its declared kind here.

use std::collections::BTreeMap;

use engine::log_debug;
use engine::{format_iso_utc, format_plain_number, parse_iso_datetime, Map, ReportError, Value};
use serde::{Deserialize, Serialize};

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Declared kind of a report parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Array,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Integer => "integer",
            ParameterKind::Float => "float",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Date => "date",
            ParameterKind::Array => "array",
        }
    }
}

/// A named, typed report parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: ParameterKind,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        ParameterDefinition {
            name: name.into(),
            kind,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

// ============================================================================
// BOUND VALUES
// ============================================================================

/// A value that has been coerced to its parameter's declared kind.
/// There is no mutable access once bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterValue(Value);

impl ParameterValue {
    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Name → value mapping produced by [`validate_parameters`] and consumed by
/// the assembler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundParameters {
    values: BTreeMap<String, ParameterValue>,
}

impl BoundParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with one more binding. Existing bindings are replaced.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), ParameterValue(value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(ParameterValue::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.value()))
    }

    /// Copies out the bindings whose names are listed. Returns the subset
    /// together with the names that had no binding, in request order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> (BoundParameters, Vec<String>) {
        let mut found = BoundParameters::new();
        let mut missing = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.values.get(name) {
                Some(value) => {
                    found.values.insert(name.to_string(), value.clone());
                }
                None => missing.push(name.to_string()),
            }
        }
        (found, missing)
    }

    /// Plain mapping view, e.g. for echoing the parameters in a report.
    pub fn to_map(&self) -> Map {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.value().clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for BoundParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        BoundParameters {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), ParameterValue(v.into())))
                .collect(),
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Binds caller-supplied values to their definitions.
///
/// Missing required parameters without a default fail with
/// `MissingParameter`; values that cannot be coerced fail with
/// `InvalidParameterType`. A present `null` counts as missing. Values
/// with no definition are ignored.
pub fn validate_parameters(
    definitions: &[ParameterDefinition],
    raw: &Map,
) -> Result<BoundParameters, ReportError> {
    let mut bound = BoundParameters::new();

    for definition in definitions {
        let supplied = raw.get(&definition.name).filter(|v| !v.is_null());

        let source = match (supplied, &definition.default) {
            (Some(value), _) => value,
            (None, Some(default)) if !default.is_null() => default,
            (None, _) if definition.required => {
                return Err(ReportError::MissingParameter(definition.name.clone()));
            }
            (None, _) => continue,
        };

        let coerced = coerce(source, definition.kind)
            .map_err(|reason| ReportError::invalid_parameter(&definition.name, definition.kind.as_str(), reason))?;
        bound.values.insert(definition.name.clone(), ParameterValue(coerced));
    }

    for name in raw.keys() {
        if !definitions.iter().any(|d| &d.name == name) {
            log_debug!("PARAMS", "ignoring undeclared parameter '{}'", name);
        }
    }

    log_debug!("PARAMS", "bound {} of {} declared parameters", bound.len(), definitions.len());
    Ok(bound)
}

/// Coerces one value to a declared kind. The error is a human-readable reason.
pub fn coerce(value: &Value, kind: ParameterKind) -> Result<Value, String> {
    match kind {
        ParameterKind::String => Ok(Value::Text(match value {
            Value::Number(n) => format_plain_number(*n),
            Value::Date(dt) => format_iso_utc(dt),
            other => other.display_string(),
        })),
        ParameterKind::Integer => coerce_integer(value),
        ParameterKind::Float => match value {
            Value::Number(n) if n.is_finite() => Ok(Value::Number(*n)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", s)),
            other => Err(format!("cannot convert {} to float", other.kind_name())),
        },
        ParameterKind::Boolean => coerce_boolean(value),
        ParameterKind::Date => match value {
            Value::Date(dt) => Ok(Value::Date(*dt)),
            Value::Text(s) => parse_iso_datetime(s)
                .map(Value::Date)
                .ok_or_else(|| format!("'{}' is not an ISO-8601 date", s)),
            other => Err(format!("cannot convert {} to date", other.kind_name())),
        },
        ParameterKind::Array => match value {
            Value::Array(items) => Ok(Value::Array(items.clone())),
            other => Ok(Value::Array(vec![other.clone()])),
        },
    }
}

fn coerce_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(Value::Number(*n)),
        Value::Number(n) => Err(format!("{} is not an integer", n)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("cannot convert {} to integer", other.kind_name())),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) if *n == 1.0 => Ok(Value::Bool(true)),
        Value::Number(n) if *n == 0.0 => Ok(Value::Bool(false)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("cannot convert {} to boolean", other.kind_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn raw(value: serde_json::Value) -> Map {
        match Value::from(value) {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_missing_required_parameter() {
        let defs = vec![ParameterDefinition::new("status", ParameterKind::String).required()];
        let err = validate_parameters(&defs, &Map::new()).unwrap_err();
        assert!(matches!(err, ReportError::MissingParameter(ref n) if n == "status"));
    }

    #[test]
    fn test_defaults_are_bound() {
        let defs = vec![
            ParameterDefinition::new("limit", ParameterKind::Integer).with_default(50i64),
            ParameterDefinition::new("status", ParameterKind::String).required().with_default("active"),
            ParameterDefinition::new("note", ParameterKind::String),
        ];
        let bound = validate_parameters(&defs, &Map::new()).unwrap();
        assert_eq!(bound.get("limit"), Some(&Value::Number(50.0)));
        assert_eq!(bound.get("status"), Some(&Value::from("active")));
        assert!(!bound.contains("note"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let defs = vec![ParameterDefinition::new("limit", ParameterKind::Integer).with_default(5i64)];
        let bound = validate_parameters(&defs, &raw(json!({"limit": null}))).unwrap();
        assert_eq!(bound.get("limit"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn test_boolean_strings() {
        for text in ["true", "1", "YES", "On"] {
            assert_eq!(coerce(&Value::from(text), ParameterKind::Boolean), Ok(Value::Bool(true)));
        }
        for text in ["false", "0", "no", "OFF"] {
            assert_eq!(coerce(&Value::from(text), ParameterKind::Boolean), Ok(Value::Bool(false)));
        }
        assert!(coerce(&Value::from("maybe"), ParameterKind::Boolean).is_err());
        assert_eq!(coerce(&Value::from(1i64), ParameterKind::Boolean), Ok(Value::Bool(true)));
        assert!(coerce(&Value::from(2i64), ParameterKind::Boolean).is_err());
    }

    #[test]
    fn test_invalid_boolean_is_reported_with_name() {
        let defs = vec![ParameterDefinition::new("active", ParameterKind::Boolean)];
        let err = validate_parameters(&defs, &raw(json!({"active": "maybe"}))).unwrap_err();
        match err {
            ReportError::InvalidParameterType { name, expected, .. } => {
                assert_eq!(name, "active");
                assert_eq!(expected, "boolean");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(coerce(&Value::from(" 42 "), ParameterKind::Integer), Ok(Value::Number(42.0)));
        assert_eq!(coerce(&Value::from(7.0), ParameterKind::Integer), Ok(Value::Number(7.0)));
        assert!(coerce(&Value::from(7.5), ParameterKind::Integer).is_err());
        assert!(coerce(&Value::from("4.2"), ParameterKind::Integer).is_err());
        assert!(coerce(&Value::Bool(true), ParameterKind::Integer).is_err());
    }

    #[test]
    fn test_float_and_string_coercion() {
        assert_eq!(coerce(&Value::from("2.5"), ParameterKind::Float), Ok(Value::Number(2.5)));
        assert!(coerce(&Value::from("abc"), ParameterKind::Float).is_err());
        assert_eq!(coerce(&Value::from(10.0), ParameterKind::String), Ok(Value::from("10")));
        assert_eq!(coerce(&Value::Bool(false), ParameterKind::String), Ok(Value::from("false")));
    }

    #[test]
    fn test_date_coercion_normalizes_to_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(coerce(&Value::from("2024-01-01"), ParameterKind::Date), Ok(Value::Date(expected)));
        assert_eq!(
            coerce(&Value::from("2024-01-01T01:00:00+01:00"), ParameterKind::Date),
            Ok(Value::Date(expected))
        );
        assert_eq!(
            coerce(&Value::from("2024-01-01T00:00:00Z"), ParameterKind::Date),
            Ok(Value::Date(expected))
        );
        assert!(coerce(&Value::from("01/01/2024"), ParameterKind::Date).is_err());
    }

    #[test]
    fn test_array_wraps_scalars() {
        assert_eq!(
            coerce(&Value::from("a"), ParameterKind::Array),
            Ok(Value::Array(vec![Value::from("a")]))
        );
        let list = Value::from(json!(["a", "b"]));
        assert_eq!(coerce(&list, ParameterKind::Array), Ok(list.clone()));
    }

    #[test]
    fn test_undeclared_values_are_ignored() {
        let defs = vec![ParameterDefinition::new("status", ParameterKind::String)];
        let bound = validate_parameters(&defs, &raw(json!({"status": "x", "extra": 1}))).unwrap();
        assert_eq!(bound.len(), 1);
        assert!(!bound.contains("extra"));
    }

    #[test]
    fn test_subset_reports_missing_names() {
        let params: BoundParameters = [("customerId", Value::from("C1")), ("year", Value::from(2024i64))]
            .into_iter()
            .collect();
        let (found, missing) = params.subset(&["customerId", "region"]);
        assert_eq!(found.get("customerId"), Some(&Value::from("C1")));
        assert!(!found.contains("year"));
        assert_eq!(missing, vec!["region".to_string()]);
    }

    #[test]
    fn test_definition_deserializes_from_config_json() {
        let def: ParameterDefinition = serde_json::from_value(json!({
            "name": "from",
            "type": "date",
            "required": true
        }))
        .unwrap();
        assert_eq!(def.kind, ParameterKind::Date);
        assert!(def.required);
        assert_eq!(def.default, None);
    }
}
