//! FILENAME: core/query-engine/src/pipeline.rs
//! PURPOSE: The resolved query pipeline and a builder for common stages.

use chrono::{DateTime, Duration, Utc};
use engine::{parse_iso_datetime, Map, ReportError, Value};
use serde::{Deserialize, Serialize};

/// An ordered sequence of stage mappings, ready for the data source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    stages: Vec<Map>,
}

impl Pipeline {
    pub fn from_stages(stages: Vec<Map>) -> Self {
        Pipeline { stages }
    }

    pub fn stages(&self) -> &[Map] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stages as plain values, i.e. a descriptor that can be assembled again.
    pub fn to_values(&self) -> Vec<Value> {
        self.stages.iter().cloned().map(Value::Object).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.stages
                .iter()
                .map(|stage| Value::Object(stage.clone()).to_json())
                .collect(),
        )
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Fluent builder for aggregation stages.
///
/// Stage bodies are mappings keyed by name, so a multi-field `$sort`
/// lists its fields in key order.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Map>,
}

fn single(key: &str, body: Value) -> Map {
    let mut stage = Map::new();
    stage.insert(key.to_string(), body);
    stage
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_stage(self, query: Map) -> Self {
        self.add_stage(single("$match", Value::Object(query)))
    }

    pub fn project(self, fields: Map) -> Self {
        self.add_stage(single("$project", Value::Object(fields)))
    }

    pub fn add_fields(self, fields: Map) -> Self {
        self.add_stage(single("$addFields", Value::Object(fields)))
    }

    /// `$group` on `group_by`, with extra accumulator fields merged into the body.
    pub fn group(self, group_by: Value, accumulators: Map) -> Self {
        let mut body = accumulators;
        body.insert("_id".to_string(), group_by);
        self.add_stage(single("$group", Value::Object(body)))
    }

    pub fn sort(self, fields: &[(&str, i64)]) -> Self {
        let body: Map = fields
            .iter()
            .map(|(field, direction)| (field.to_string(), Value::from(*direction)))
            .collect();
        self.add_stage(single("$sort", Value::Object(body)))
    }

    pub fn limit(self, count: u64) -> Self {
        self.add_stage(single("$limit", Value::Number(count as f64)))
    }

    pub fn skip(self, count: u64) -> Self {
        self.add_stage(single("$skip", Value::Number(count as f64)))
    }

    pub fn lookup(self, from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        let mut body = Map::new();
        body.insert("from".to_string(), Value::from(from));
        body.insert("localField".to_string(), Value::from(local_field));
        body.insert("foreignField".to_string(), Value::from(foreign_field));
        body.insert("as".to_string(), Value::from(as_field));
        self.add_stage(single("$lookup", Value::Object(body)))
    }

    pub fn unwind(self, path: &str, preserve_null_and_empty_arrays: bool) -> Self {
        let mut body = Map::new();
        body.insert("path".to_string(), Value::from(path));
        if preserve_null_and_empty_arrays {
            body.insert("preserveNullAndEmptyArrays".to_string(), Value::Bool(true));
        }
        self.add_stage(single("$unwind", Value::Object(body)))
    }

    pub fn count(self, field: &str) -> Self {
        self.add_stage(single("$count", Value::from(field)))
    }

    pub fn add_stage(mut self, stage: Map) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::from_stages(self.stages)
    }
}

// ============================================================================
// FILTER HELPERS
// ============================================================================

/// `{field: {"$gte": from, "$lte": to}}`. Text bounds are parsed as ISO-8601;
/// a date-only upper bound extends to the end of that day.
pub fn date_range_filter(field: &str, from: &Value, to: &Value) -> Result<Map, ReportError> {
    let from = date_bound(field, from, false)?;
    let to = date_bound(field, to, true)?;

    let mut range = Map::new();
    range.insert("$gte".to_string(), Value::Date(from));
    range.insert("$lte".to_string(), Value::Date(to));
    Ok(single(field, Value::Object(range)))
}

fn date_bound(field: &str, value: &Value, end_of_day: bool) -> Result<DateTime<Utc>, ReportError> {
    match value {
        Value::Date(dt) => Ok(*dt),
        Value::Text(text) => {
            let parsed = parse_iso_datetime(text)
                .ok_or_else(|| ReportError::invalid_parameter(field, "date", format!("'{}' is not an ISO-8601 date", text)))?;
            let is_date_only = text.trim().len() == 10;
            if end_of_day && is_date_only {
                Ok(parsed + Duration::days(1) - Duration::microseconds(1))
            } else {
                Ok(parsed)
            }
        }
        other => Err(ReportError::invalid_parameter(
            field,
            "date",
            format!("cannot use {} as a date bound", other.kind_name()),
        )),
    }
}

/// Equality for a single value, `$in` for several.
pub fn in_filter(field: &str, values: &[Value]) -> Map {
    match values {
        [only] => single(field, only.clone()),
        many => single(field, Value::Object(single("$in", Value::Array(many.to_vec())))),
    }
}

/// Case-insensitive regex match of `term` across `fields`. Empty term → empty filter.
pub fn text_search_filter(fields: &[&str], term: &str) -> Map {
    if term.is_empty() {
        return Map::new();
    }
    let alternatives = fields
        .iter()
        .map(|field| {
            let mut condition = Map::new();
            condition.insert("$regex".to_string(), Value::from(term));
            condition.insert("$options".to_string(), Value::from("i"));
            Value::Object(single(field, Value::Object(condition)))
        })
        .collect();
    single("$or", Value::Array(alternatives))
}
