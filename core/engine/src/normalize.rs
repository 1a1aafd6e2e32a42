//! FILENAME: core/engine/src/normalize.rs
//! PURPOSE: Result normalization and dotted-path field access.
//! CONTEXT: Raw records arrive from the data source in whatever shape the
//! driver produced. This module turns them into the canonical form the
//! transformers expect and provides the nested path walker they all share.

use crate::logging::{log_debug, log_warn};
use crate::value::{format_iso_utc, Value};

/// Resolves a dot-separated field path against a record.
///
/// Walks nested mappings one segment at a time. A missing segment or a
/// non-mapping intermediate yields `None`; resolution never fails.
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Like [`resolve_path`], but maps missing values to `Value::Null`.
pub fn resolve_path_or_null<'a>(record: &'a Value, path: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    resolve_path(record, path).unwrap_or(&NULL)
}

/// Normalizes a batch of raw records.
///
/// Records that are not mappings cannot be addressed by field path and are
/// dropped with a warning. The surviving records keep their input order.
pub fn normalize_records(raw: Vec<Value>) -> Vec<Value> {
    let total = raw.len();
    let normalized: Vec<Value> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match record {
            Value::Object(_) => Some(normalize_record(record)),
            other => {
                log_warn!(
                    "NORMALIZE",
                    "dropping record #{}: expected a document, got {}",
                    index,
                    other.kind_name()
                );
                None
            }
        })
        .collect();

    log_debug!("NORMALIZE", "normalized {} of {} records", normalized.len(), total);
    normalized
}

/// Normalizes the top-level fields of a single document:
/// temporal values become ISO-8601 strings and non-finite numbers become null.
pub fn normalize_record(record: Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize_scalar(value)))
                .collect(),
        ),
        other => other,
    }
}

fn normalize_scalar(value: Value) -> Value {
    match value {
        Value::Date(dt) => Value::Text(format_iso_utc(&dt)),
        Value::Number(n) if !n.is_finite() => Value::Null,
        other => other,
    }
}
