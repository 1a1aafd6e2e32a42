//! FILENAME: core/tablix-engine/src/reshape.rs
//! Record Reshaping - Grouping, sorting and filtering before projection.
//!
//! These run on normalized records and return new record lists; none of
//! them touch column specs or formatting. Field names are dotted paths
//! resolved the same way table cells are.

use std::cmp::Ordering;

use engine::{log_debug, log_warn};
use engine::{parse_iso_datetime, resolve_path_or_null, Map, Value};
use pivot_engine::{AggregationType, KeyValue, MeasureAccumulator};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Output field holding the number of records in a group.
pub const GROUP_SIZE_FIELD: &str = "_group_size";

// ============================================================================
// GROUPING
// ============================================================================

/// One aggregated field of a grouped row, written as `<field>_<type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAggregation {
    pub field: String,

    #[serde(rename = "type", default)]
    pub aggregation: AggregationType,
}

impl FieldAggregation {
    pub fn new(field: impl Into<String>, aggregation: AggregationType) -> Self {
        FieldAggregation {
            field: field.into(),
            aggregation,
        }
    }

    pub fn output_name(&self) -> String {
        let suffix = match self.aggregation {
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Count => "count",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
        };
        format!("{}_{}", self.field, suffix)
    }
}

struct Group<'a> {
    key_values: Vec<Value>,
    members: Vec<&'a Value>,
}

/// Groups records by the values at `group_by`, one output row per distinct
/// combination in order of first appearance.
///
/// Each row carries the grouping fields (keyed by their path), one entry per
/// aggregation and `_group_size`. Sum/avg/min/max only read values that are
/// numbers and are left out when a group has none; count is the group size.
pub fn group_records(records: &[Value], group_by: &[String], aggregations: &[FieldAggregation]) -> Vec<Value> {
    let mut index: FxHashMap<Vec<KeyValue>, usize> = FxHashMap::default();
    let mut groups: Vec<Group> = Vec::new();

    for record in records {
        let key_values: Vec<Value> = group_by
            .iter()
            .map(|field| resolve_path_or_null(record, field).clone())
            .collect();
        let key: Vec<KeyValue> = key_values.iter().map(KeyValue::from).collect();

        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                key_values,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(record);
    }

    log_debug!("TABLE", "grouped {} records into {} groups", records.len(), groups.len());

    groups
        .into_iter()
        .map(|group| {
            let mut row = Map::new();
            for (field, value) in group_by.iter().zip(group.key_values) {
                row.insert(field.clone(), value);
            }
            for aggregation in aggregations {
                if let Some(value) = aggregate(&group.members, aggregation) {
                    row.insert(aggregation.output_name(), Value::Number(value));
                }
            }
            row.insert(GROUP_SIZE_FIELD.to_string(), Value::Number(group.members.len() as f64));
            Value::Object(row)
        })
        .collect()
}

fn aggregate(members: &[&Value], aggregation: &FieldAggregation) -> Option<f64> {
    if aggregation.aggregation == AggregationType::Count {
        return Some(members.len() as f64);
    }

    let mut acc = MeasureAccumulator::new();
    for member in members {
        if let Some(n) = resolve_path_or_null(member, &aggregation.field).as_f64() {
            acc.add(n);
        }
    }
    (!acc.is_empty()).then(|| acc.compute(aggregation.aggregation))
}

// ============================================================================
// SORTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,

    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Stable multi-key sort. Strings that parse as numbers sort as numbers and
/// missing values sort as the empty string. Values of different kinds fall
/// back to the `KeyValue` kind order, so the sort never fails.
pub fn sort_records(records: &[Value], keys: &[SortKey]) -> Vec<Value> {
    let mut keyed: Vec<(Vec<KeyValue>, &Value)> = records
        .iter()
        .map(|record| {
            let key = keys
                .iter()
                .map(|k| sort_value(resolve_path_or_null(record, &k.field)))
                .collect();
            (key, record)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b))
            .map(|(key, (left, right))| match key.direction {
                SortDirection::Asc => left.cmp(right),
                SortDirection::Desc => right.cmp(left),
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    keyed.into_iter().map(|(_, record)| record.clone()).collect()
}

fn sort_value(value: &Value) -> KeyValue {
    match value {
        Value::Null => KeyValue::Text(String::new()),
        Value::Text(text) => match value.to_number() {
            Some(n) => KeyValue::from(&Value::Number(n)),
            None => KeyValue::Text(text.clone()),
        },
        other => KeyValue::from(other),
    }
}

// ============================================================================
// FILTERING
// ============================================================================

const OPERATORS: [&str; 8] = ["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin"];

/// Keeps the records matching every entry of `criteria`.
///
/// A criterion is either a plain value (equality) or a mapping of operators
/// (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`) that must all
/// hold. A mapping whose keys start with `$` is an operator set; unknown
/// operators are ignored with a warning. Ordering comparisons only match
/// values of the same kind (numbers, text, or dates including ISO text), so
/// a missing value never satisfies them.
pub fn filter_records(records: &[Value], criteria: &Map) -> Vec<Value> {
    for (field, criterion) in criteria {
        if let Some(ops) = operator_set(criterion) {
            for op in ops.keys().filter(|op| !OPERATORS.contains(&op.as_str())) {
                log_warn!("TABLE", "filter on '{}' ignores unknown operator '{}'", field, op);
            }
        }
    }

    let kept: Vec<Value> = records
        .iter()
        .filter(|record| {
            criteria
                .iter()
                .all(|(field, criterion)| satisfies(resolve_path_or_null(record, field), criterion))
        })
        .cloned()
        .collect();

    log_debug!("TABLE", "filter kept {} of {} records", kept.len(), records.len());
    kept
}

fn operator_set(criterion: &Value) -> Option<&Map> {
    criterion
        .as_object()
        .filter(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn satisfies(value: &Value, criterion: &Value) -> bool {
    let Some(ops) = operator_set(criterion) else {
        return value == criterion;
    };

    ops.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => value == operand,
        "$ne" => value != operand,
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
        "$in" => operand.as_array().is_some_and(|items| items.contains(value)),
        "$nin" => !operand.as_array().is_some_and(|items| items.contains(value)),
        _ => true,
    })
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Text(b)) => parse_iso_datetime(b).map(|b| a.cmp(&b)),
        (Value::Text(a), Value::Date(b)) => parse_iso_datetime(a).map(|a| a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
