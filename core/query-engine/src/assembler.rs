//! FILENAME: core/query-engine/src/assembler.rs
//! PURPOSE: Resolves `{{name}}` tokens in a query descriptor against bound parameters.
//! CONTEXT: Substitution walks the parsed descriptor tree instead of editing
//! its serialized text, so a token can only ever replace a whole string
//! field or a span inside one. Text that arrives through a parameter value
//! is never scanned again.

use chrono::SecondsFormat;
use engine::log_warn;
use engine::{format_plain_number, Map, ReportError, Value};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parameters::BoundParameters;
use crate::pipeline::Pipeline;

/// `{{name}}` with no braces inside the name.
static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("token pattern is a valid regex"));

/// Resolves every token in `descriptor` and checks that each resolved stage
/// is a mapping.
///
/// A string field that is exactly one token takes the bound value with its
/// own type (numbers stay numbers, lists become arrays, dates become
/// `{"$date": "...Z"}`). A token inside a longer string is interpolated as
/// text, which only scalars allow.
pub fn assemble_query(descriptor: &[Value], params: &BoundParameters) -> Result<Pipeline, ReportError> {
    let mut stages = Vec::with_capacity(descriptor.len());

    for (index, stage) in descriptor.iter().enumerate() {
        let resolved = substitute(stage, params).map_err(|e| {
            log_warn!("QUERY", "stage #{} failed to resolve: {}", index, e);
            e
        })?;
        if let Some(name) = leftover_token(&resolved) {
            log_warn!("QUERY", "stage #{} still holds token '{}' after substitution", index, name);
            return Err(ReportError::PipelineResolution(format!(
                "token '{{{{{}}}}}' remains in stage #{} after substitution",
                name, index
            )));
        }
        match resolved {
            Value::Object(map) => stages.push(map),
            other => {
                return Err(ReportError::PipelineResolution(format!(
                    "stage #{} resolved to {}, expected a mapping",
                    index,
                    other.kind_name()
                )));
            }
        }
    }

    Ok(Pipeline::from_stages(stages))
}

/// Distinct token names referenced anywhere in the descriptor, in order of
/// first appearance (keys included).
pub fn unresolved_tokens(descriptor: &[Value]) -> Vec<String> {
    let mut names = Vec::new();
    for stage in descriptor {
        collect_tokens(stage, &mut names);
    }
    names
}

/// First token still present in a resolved stage. Parameter values are not
/// substituted again, so a value carrying `{{...}}` text ends up here.
fn leftover_token(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => first_token(text),
        Value::Array(items) => items.iter().find_map(leftover_token),
        Value::Object(map) => map
            .iter()
            .find_map(|(key, child)| first_token(key).or_else(|| leftover_token(child))),
        _ => None,
    }
}

fn first_token(text: &str) -> Option<String> {
    TOKEN.find(text).map(|m| token_name(m.as_str()).to_string())
}

fn collect_tokens(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::Text(text) => push_token_names(text, names),
        Value::Array(items) => items.iter().for_each(|item| collect_tokens(item, names)),
        Value::Object(map) => {
            for (key, child) in map {
                push_token_names(key, names);
                collect_tokens(child, names);
            }
        }
        _ => {}
    }
}

fn push_token_names(text: &str, names: &mut Vec<String>) {
    for m in TOKEN.find_iter(text) {
        let name = token_name(m.as_str());
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
}

// ============================================================================
// SUBSTITUTION
// ============================================================================

fn substitute(value: &Value, params: &BoundParameters) -> Result<Value, ReportError> {
    match value {
        Value::Text(text) => substitute_text(text, params),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = Map::new();
            for (key, child) in map {
                resolved.insert(interpolate(key, params)?, substitute(child, params)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_text(text: &str, params: &BoundParameters) -> Result<Value, ReportError> {
    if let Some(m) = TOKEN.find(text) {
        if m.start() == 0 && m.end() == text.len() {
            let bound = lookup(token_name(m.as_str()), params)?;
            return Ok(to_literal(bound));
        }
    }
    interpolate(text, params).map(Value::Text)
}

/// Replaces every token inside `text` with the textual form of its value.
fn interpolate(text: &str, params: &BoundParameters) -> Result<String, ReportError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in TOKEN.find_iter(text) {
        let name = token_name(m.as_str());
        let embedded = match lookup(name, params)? {
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_plain_number(*n),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(ReportError::PipelineResolution(format!(
                    "parameter '{}' holds {} and cannot be embedded in the string \"{}\"",
                    name,
                    other.kind_name(),
                    text
                )));
            }
        };
        out.push_str(&text[last..m.start()]);
        out.push_str(&embedded);
        last = m.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

fn lookup<'a>(name: &str, params: &'a BoundParameters) -> Result<&'a Value, ReportError> {
    params.get(name).ok_or_else(|| {
        ReportError::PipelineResolution(format!("no parameter bound for token '{{{{{}}}}}'", name))
    })
}

/// Strips the surrounding braces of a matched token.
fn token_name(token: &str) -> &str {
    &token[2..token.len() - 2]
}

/// Typed literal for a whole-token substitution. Dates become
/// `{"$date": ...}` markers with millisecond precision.
fn to_literal(value: &Value) -> Value {
    match value {
        Value::Date(dt) => {
            let mut marker = Map::new();
            marker.insert(
                "$date".to_string(),
                Value::Text(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            Value::Object(marker)
        }
        Value::Array(items) => Value::Array(items.iter().map(to_literal).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), to_literal(v))).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn descriptor(value: serde_json::Value) -> Vec<Value> {
        match Value::from(value) {
            Value::Array(items) => items,
            _ => panic!("descriptor fixture must be an array"),
        }
    }

    fn resolved(pipeline: &Pipeline) -> serde_json::Value {
        pipeline.to_json()
    }

    #[test]
    fn test_status_substitution() {
        let params = BoundParameters::new().with("status", "active");
        let pipeline = assemble_query(&descriptor(json!([{"$match": {"status": "{{status}}"}}])), &params).unwrap();
        assert_eq!(resolved(&pipeline), json!([{"$match": {"status": "active"}}]));
    }

    #[test]
    fn test_whole_token_keeps_value_type() {
        let params = BoundParameters::new()
            .with("limit", 10i64)
            .with("ids", Value::from(json!(["a", "b"])))
            .with("flag", true)
            .with("filter", Value::from(json!({"$gt": 5})));
        let pipeline = assemble_query(
            &descriptor(json!([
                {"$match": {"_id": {"$in": "{{ids}}"}, "active": "{{flag}}", "score": "{{filter}}"}},
                {"$limit": "{{limit}}"}
            ])),
            &params,
        )
        .unwrap();
        assert_eq!(
            resolved(&pipeline),
            json!([
                {"$match": {"_id": {"$in": ["a", "b"]}, "active": true, "score": {"$gt": 5}}},
                {"$limit": 10}
            ])
        );
    }

    #[test]
    fn test_date_becomes_marker() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let params = BoundParameters::new().with("from", from);
        let pipeline = assemble_query(&descriptor(json!([{"$match": {"created": {"$gte": "{{from}}"}}}])), &params).unwrap();
        assert_eq!(
            resolved(&pipeline),
            json!([{"$match": {"created": {"$gte": {"$date": "2024-01-01T00:00:00.000Z"}}}}])
        );
    }

    #[test]
    fn test_embedded_tokens_interpolate_text() {
        let params = BoundParameters::new().with("prefix", "INV").with("year", 2024i64);
        let pipeline = assemble_query(
            &descriptor(json!([{"$match": {"number": {"$regex": "^{{prefix}}-{{year}}-"}}}])),
            &params,
        )
        .unwrap();
        assert_eq!(resolved(&pipeline), json!([{"$match": {"number": {"$regex": "^INV-2024-"}}}]));
    }

    #[test]
    fn test_tokens_in_keys() {
        let params = BoundParameters::new().with("field", "region");
        let pipeline = assemble_query(&descriptor(json!([{"$sort": {"{{field}}": 1}}])), &params).unwrap();
        assert_eq!(resolved(&pipeline), json!([{"$sort": {"region": 1}}]));
    }

    #[test]
    fn test_embedding_array_fails() {
        let params = BoundParameters::new().with("ids", Value::from(json!(["a"])));
        let err = assemble_query(&descriptor(json!([{"$match": {"note": "ids: {{ids}}"}}])), &params).unwrap_err();
        assert!(matches!(err, ReportError::PipelineResolution(_)));
    }

    #[test]
    fn test_unbound_token_fails() {
        let err = assemble_query(&descriptor(json!([{"$match": {"status": "{{status}}"}}])), &BoundParameters::new())
            .unwrap_err();
        match err {
            ReportError::PipelineResolution(message) => assert!(message.contains("{{status}}")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_name_substring_is_not_touched() {
        let params = BoundParameters::new().with("id", "X");
        let pipeline = assemble_query(&descriptor(json!([{"$match": {"id": "valid-id", "ref": "{{id}}"}}])), &params).unwrap();
        assert_eq!(resolved(&pipeline), json!([{"$match": {"id": "valid-id", "ref": "X"}}]));
    }

    #[test]
    fn test_no_double_substitution() {
        let params = BoundParameters::new().with("a", "{{b}}").with("b", "secret");
        for stage in [json!({"$match": {"x": "{{a}}"}}), json!({"$match": {"y": "pre {{a}}"}})] {
            let err = assemble_query(&descriptor(json!([stage])), &params).unwrap_err();
            match err {
                ReportError::PipelineResolution(message) => {
                    assert!(message.contains("{{b}}"));
                    assert!(!message.contains("secret"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_token_inside_list_parameter_fails() {
        let params = BoundParameters::new().with("ids", Value::from(json!(["a", "{{x}}"])));
        let err = assemble_query(&descriptor(json!([{"$match": {"_id": {"$in": "{{ids}}"}}}])), &params).unwrap_err();
        match err {
            ReportError::PipelineResolution(message) => assert!(message.contains("{{x}}")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_token_inside_mapping_parameter_fails() {
        let params = BoundParameters::new().with("filter", Value::from(json!({"{{field}}": {"$gt": 5}})));
        let err = assemble_query(&descriptor(json!([{"$match": "{{filter}}"}])), &params).unwrap_err();
        assert!(matches!(err, ReportError::PipelineResolution(ref m) if m.contains("{{field}}")));
    }

    #[test]
    fn test_key_resolving_to_token_fails() {
        let params = BoundParameters::new().with("field", "{{other}}");
        let err = assemble_query(&descriptor(json!([{"$sort": {"{{field}}": 1}}])), &params).unwrap_err();
        assert!(matches!(err, ReportError::PipelineResolution(_)));
    }

    #[test]
    fn test_token_free_descriptor_is_unchanged() {
        let raw = descriptor(json!([{"$match": {"a": 1, "b": ["x", {"c": null}]}}, {"$limit": 5}]));
        let params = BoundParameters::new().with("unused", "value");
        let pipeline = assemble_query(&raw, &params).unwrap();
        assert_eq!(pipeline.to_values(), raw);
    }

    #[test]
    fn test_resolving_resolved_descriptor_is_idempotent() {
        let params = BoundParameters::new()
            .with("from", Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
            .with("status", "open");
        let raw = descriptor(json!([{"$match": {"created": "{{from}}", "status": "{{status}}"}}]));
        let once = assemble_query(&raw, &params).unwrap();
        let twice = assemble_query(&once.to_values(), &BoundParameters::new()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_mapping_stage_fails() {
        let err = assemble_query(&descriptor(json!([{"$limit": 1}, "oops"])), &BoundParameters::new()).unwrap_err();
        assert!(matches!(err, ReportError::PipelineResolution(_)));
    }

    #[test]
    fn test_unresolved_tokens_lists_distinct_names() {
        let raw = descriptor(json!([
            {"$match": {"a": "{{x}}", "{{k}}": "{{x}}-{{y}}"}},
            {"$limit": "{{n}}"}
        ]));
        let mut names = unresolved_tokens(&raw);
        names.sort();
        assert_eq!(names, vec!["k", "n", "x", "y"]);
    }
}
