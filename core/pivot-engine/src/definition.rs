//! FILENAME: core/pivot-engine/src/definition.rs
//! Pivot Definition - The serializable configuration.
//!
//! This module contains the types that DESCRIBE a pivot: which record
//! fields form the row and column dimensions, which fields are measured
//! and how. Definitions are loaded from report configuration files and
//! never mutated during a calculation.

use engine::ReportError;
use serde::{Deserialize, Serialize};

/// Default cap on distinct column keys.
pub const DEFAULT_MAX_COLUMNS: usize = 200;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Default for AggregationType {
    fn default() -> Self {
        AggregationType::Sum
    }
}

// ============================================================================
// MEASURES
// ============================================================================

fn default_measure_name() -> String {
    "value".to_string()
}

fn default_measure_field() -> String {
    "value".to_string()
}

/// A measured field: its output name, the record path it reads and the
/// aggregation applied per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    #[serde(default = "default_measure_name")]
    pub name: String,

    /// Dot-separated record path.
    #[serde(default = "default_measure_field")]
    pub field: String,

    #[serde(rename = "type", default)]
    pub aggregation: AggregationType,
}

impl MeasureSpec {
    pub fn new(name: impl Into<String>, field: impl Into<String>, aggregation: AggregationType) -> Self {
        MeasureSpec {
            name: name.into(),
            field: field.into(),
            aggregation,
        }
    }
}

// ============================================================================
// PIVOT SPEC
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_max_columns() -> usize {
    DEFAULT_MAX_COLUMNS
}

/// The complete pivot definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    /// Row dimension paths, outermost first.
    pub rows: Vec<String>,

    /// Column dimension paths, outermost first.
    pub columns: Vec<String>,

    pub measures: Vec<MeasureSpec>,

    /// Show row and column totals.
    #[serde(default = "default_true")]
    pub show_totals: bool,

    /// Show the grand total (only when `show_totals` is also set).
    #[serde(default = "default_true")]
    pub show_grand_total: bool,

    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
}

impl PivotSpec {
    pub fn new(rows: Vec<String>, columns: Vec<String>, measures: Vec<MeasureSpec>) -> Self {
        PivotSpec {
            rows,
            columns,
            measures,
            show_totals: true,
            show_grand_total: true,
            max_columns: DEFAULT_MAX_COLUMNS,
        }
    }

    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns;
        self
    }

    /// Rejects definitions no calculation can honour: a zero column cap
    /// or two measures with the same name.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.max_columns == 0 {
            return Err(ReportError::Configuration(
                "pivot max_columns must be at least 1".to_string(),
            ));
        }

        for (i, measure) in self.measures.iter().enumerate() {
            if self.measures[..i].iter().any(|m| m.name == measure.name) {
                return Err(ReportError::Configuration(format!(
                    "pivot measure '{}' is defined more than once",
                    measure.name
                )));
            }
        }

        Ok(())
    }

    /// Measure names in definition order.
    pub fn measure_names(&self) -> Vec<String> {
        self.measures.iter().map(|m| m.name.clone()).collect()
    }
}
