//! FILENAME: core/engine/src/value.rs
//! PURPOSE: Defines the dynamically-typed value shared by records, parameters and pipelines.
//! CONTEXT: Documents coming back from the data source are arbitrary nested
//! key/value trees. Rather than inspecting them reflectively, every part of the
//! report core works over this closed set of cases: the path walker, the
//! dimension-key builder, the token substitution pass and the formatter.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Mapping type used for documents and pipeline stages.
/// Key order is not significant; BTreeMap keeps output deterministic.
pub type Map = BTreeMap<String, Value>;

/// A single dynamically-typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(#[serde(serialize_with = "serialize_number")] f64),
    Text(String),
    /// A UTC instant. Only produced by parameter coercion; deserializing
    /// never yields it (date strings stay `Text`).
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Map),
}

/// Integral numbers are written without a fractional part so that
/// `{"$limit": 10}` survives a round trip through `Value` unchanged.
fn serialize_number<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serializer.serialize_i64(*n as i64)
    } else {
        serializer.serialize_f64(*n)
    }
}

/// Formats a UTC instant as ISO-8601 with an explicit `Z` suffix.
/// Fractional seconds are only written when present.
pub fn format_iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values substituted as a bare literal (text, number, boolean).
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Number(_) | Value::Text(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a direct child of a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Returns the value as a number if it is numerically parseable:
    /// finite numbers, or text that parses as a finite number.
    /// Booleans and containers are not numeric.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Plain string representation, without locale-specific formatting.
    /// Null renders as the empty string.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_plain_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(dt) => format_iso_utc(dt),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Converts into a `serde_json::Value`, e.g. for handing a resolved
    /// pipeline to a driver. Dates become `{"$date": "...Z"}` markers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(dt) => {
                let mut marker = serde_json::Map::new();
                marker.insert("$date".to_string(), serde_json::Value::String(format_iso_utc(dt)));
                serde_json::Value::Object(marker)
            }
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Formats a number without unnecessary decimal places.
pub fn format_plain_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_structure() {
        let value = Value::from(json!({"a": {"b": [1, "x", null, true]}}));
        let inner = value.get("a").and_then(|a| a.get("b")).and_then(Value::as_array);
        assert_eq!(
            inner,
            Some(&[Value::Number(1.0), Value::from("x"), Value::Null, Value::Bool(true)][..])
        );
    }

    #[test]
    fn test_integral_numbers_serialize_without_fraction() {
        let value = Value::from(json!({"$limit": 10, "ratio": 0.5}));
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"$limit":10,"ratio":0.5}"#);
    }

    #[test]
    fn test_deserialize_roundtrip_through_json() {
        let parsed: Value = serde_json::from_str(r#"[{"$match":{"n":3,"s":"a"}}]"#).unwrap();
        assert_eq!(parsed, Value::from(json!([{"$match": {"n": 3, "s": "a"}}])));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(4.5).to_number(), Some(4.5));
        assert_eq!(Value::from(" 12 ").to_number(), Some(12.0));
        assert_eq!(Value::from("abc").to_number(), None);
        assert_eq!(Value::Bool(true).to_number(), None);
        assert_eq!(Value::Number(f64::NAN).to_number(), None);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Null.display_string(), "");
        assert_eq!(Value::from(42.0).display_string(), "42");
        assert_eq!(Value::from(1.25).display_string(), "1.25");
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(Value::Date(dt).display_string(), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_date_to_json_marker() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Value::Date(dt).to_json(), json!({"$date": "2024-01-02T03:04:05Z"}));
    }
}
