//! FILENAME: core/pivot-engine/src/cache.rs
//! Pivot Cache - Hashable, totally ordered keys and measure accumulators.
//!
//! Record values are dynamically typed; to group and sort them they are
//! converted into `KeyValue`s, which implement `Eq`, `Hash` and `Ord`.
//! One `DimensionKey` identifies a row or a column of the pivot.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use engine::{resolve_path, Map, Value};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::AggregationType;

// ============================================================================
// ORDERED FLOAT
// ============================================================================

/// Wrapper around f64 that implements Eq, Ord and Hash for use as map keys.
/// `-0.0` is stored as `0.0` and every NaN as the same NaN, so bitwise
/// equality and `total_cmp` agree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedFloat(f64);

impl OrderedFloat {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            OrderedFloat(f64::NAN)
        } else if value == 0.0 {
            OrderedFloat(0.0)
        } else {
            OrderedFloat(value)
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

// ============================================================================
// KEY VALUES
// ============================================================================

/// A normalized, hashable representation of a record value.
///
/// Sort order: Empty < Number < Text < Boolean < Date < Composite < Object.
/// Composites compare element by element, a shorter prefix first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    Empty,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
    Date(DateTime<Utc>),
    Composite(Vec<KeyValue>),
    Object(Vec<(String, KeyValue)>),
}

impl KeyValue {
    fn rank(&self) -> u8 {
        match self {
            KeyValue::Empty => 0,
            KeyValue::Number(_) => 1,
            KeyValue::Text(_) => 2,
            KeyValue::Boolean(_) => 3,
            KeyValue::Date(_) => 4,
            KeyValue::Composite(_) => 5,
            KeyValue::Object(_) => 6,
        }
    }

    /// Converts back to a record value (for labels and output).
    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Empty => Value::Null,
            KeyValue::Number(n) => Value::Number(n.as_f64()),
            KeyValue::Text(s) => Value::Text(s.clone()),
            KeyValue::Boolean(b) => Value::Bool(*b),
            KeyValue::Date(dt) => Value::Date(*dt),
            KeyValue::Composite(items) => Value::Array(items.iter().map(KeyValue::to_value).collect()),
            KeyValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<Map>(),
            ),
        }
    }

    pub fn label(&self) -> String {
        self.to_value().display_string()
    }
}

impl From<&Value> for KeyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyValue::Empty,
            Value::Bool(b) => KeyValue::Boolean(*b),
            Value::Number(n) => KeyValue::Number(OrderedFloat::new(*n)),
            Value::Text(s) => KeyValue::Text(s.clone()),
            Value::Date(dt) => KeyValue::Date(*dt),
            Value::Array(items) => KeyValue::Composite(items.iter().map(KeyValue::from).collect()),
            Value::Object(map) => {
                KeyValue::Object(map.iter().map(|(k, v)| (k.clone(), KeyValue::from(v))).collect())
            }
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Empty, KeyValue::Empty) => Ordering::Equal,
            (KeyValue::Number(a), KeyValue::Number(b)) => a.cmp(b),
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            (KeyValue::Boolean(a), KeyValue::Boolean(b)) => a.cmp(b),
            (KeyValue::Date(a), KeyValue::Date(b)) => a.cmp(b),
            // Slice ordering is lexicographic with shorter prefixes first
            (KeyValue::Composite(a), KeyValue::Composite(b)) => a.cmp(b),
            (KeyValue::Object(a), KeyValue::Object(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// ============================================================================
// DIMENSION KEYS
// ============================================================================

/// Identifies one row or one column of the pivot.
/// A single declared path yields `Single`, several yield `Tuple`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DimensionKey {
    Single(KeyValue),
    Tuple(SmallVec<[KeyValue; 4]>),
}

impl DimensionKey {
    /// Builds the key of `record` for the given dimension paths.
    ///
    /// With one path, a missing or null value yields `None`: the record
    /// contributes no key on this axis. With several paths, missing parts
    /// become `KeyValue::Empty`.
    pub fn from_record(record: &Value, paths: &[String]) -> Option<DimensionKey> {
        match paths {
            [path] => match resolve_path(record, path) {
                None | Some(Value::Null) => None,
                Some(value) => Some(DimensionKey::Single(KeyValue::from(value))),
            },
            _ => Some(DimensionKey::Tuple(
                paths
                    .iter()
                    .map(|path| resolve_path(record, path).map_or(KeyValue::Empty, KeyValue::from))
                    .collect(),
            )),
        }
    }

    /// Display label: the value's string form, or tuple parts joined with " - ".
    pub fn label(&self) -> String {
        match self {
            DimensionKey::Single(value) => value.label(),
            DimensionKey::Tuple(parts) => parts
                .iter()
                .map(KeyValue::label)
                .collect::<Vec<_>>()
                .join(" - "),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DimensionKey::Single(value) => value.to_value(),
            DimensionKey::Tuple(parts) => Value::Array(parts.iter().map(KeyValue::to_value).collect()),
        }
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Running aggregate for one measure in one cell. Division for averages
/// is deferred to `compute`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasureAccumulator {
    pub sum: f64,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MeasureAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a numeric value to the accumulator.
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Computes the final aggregate value. An empty accumulator yields 0.
    pub fn compute(&self, aggregation: AggregationType) -> f64 {
        match aggregation {
            AggregationType::Sum => self.sum,
            AggregationType::Count => self.count as f64,
            AggregationType::Avg => {
                if self.count > 0 {
                    self.sum / (self.count as f64)
                } else {
                    0.0
                }
            }
            AggregationType::Min => self.min.unwrap_or(0.0),
            AggregationType::Max => self.max.unwrap_or(0.0),
        }
    }
}
