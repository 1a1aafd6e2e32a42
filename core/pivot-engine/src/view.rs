//! FILENAME: core/pivot-engine/src/view.rs
//! Pivot View - The calculated, report-ready output.
//!
//! A `PivotResult` is dense: every (row, column) pair has a cell, and every
//! cell carries a value for every measure. Keys are stored in sorted order
//! alongside their display labels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::DimensionKey;
use crate::definition::AggregationType;

/// Measure name -> value.
pub type MeasureValues = BTreeMap<String, f64>;

// ============================================================================
// WARNINGS
// ============================================================================

/// Non-fatal conditions met during a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PivotWarning {
    /// More distinct column keys than `max_columns`; only the first
    /// `retained` in sorted order were kept.
    ColumnsTruncated { distinct: usize, retained: usize },
}

impl fmt::Display for PivotWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PivotWarning::ColumnsTruncated { distinct, retained } => write!(
                f,
                "pivot has {} distinct columns; limited to the first {}",
                distinct, retained
            ),
        }
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Statistics for one measure over the non-zero cells of the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSummary {
    pub aggregation: AggregationType,
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PivotSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub cell_count: usize,
    /// Measures without any non-zero cell are absent.
    pub measures: BTreeMap<String, MeasureSummary>,
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PivotResult {
    /// Distinct row keys, sorted.
    pub row_keys: Vec<DimensionKey>,
    pub row_labels: Vec<String>,

    /// Distinct column keys, sorted and possibly truncated.
    pub column_keys: Vec<DimensionKey>,
    pub column_labels: Vec<String>,

    /// Measure names in definition order.
    pub measures: Vec<String>,

    /// `cells[row][column]`, dense.
    pub cells: Vec<Vec<MeasureValues>>,

    /// One entry per row key; empty when totals are hidden.
    pub row_totals: Vec<MeasureValues>,

    /// One entry per column key; empty when totals are hidden.
    pub column_totals: Vec<MeasureValues>,

    pub grand_totals: Option<MeasureValues>,

    pub warnings: Vec<PivotWarning>,

    pub summary: PivotSummary,
}

impl PivotResult {
    pub fn row_count(&self) -> usize {
        self.row_keys.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_keys.len()
    }

    pub fn row_index(&self, key: &DimensionKey) -> Option<usize> {
        self.row_keys.binary_search(key).ok()
    }

    pub fn column_index(&self, key: &DimensionKey) -> Option<usize> {
        self.column_keys.binary_search(key).ok()
    }

    /// Value of `measure` at (`row`, `column`).
    pub fn value(&self, row: &DimensionKey, column: &DimensionKey, measure: &str) -> Option<f64> {
        let r = self.row_index(row)?;
        let c = self.column_index(column)?;
        self.cells[r][c].get(measure).copied()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
