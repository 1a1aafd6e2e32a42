//! FILENAME: core/tablix-engine/src/view.rs
//! Table View - Report-ready table output.
//!
//! Every cell keeps both the raw value and its formatted string, so a
//! renderer can display the text while exports still see the number.

use std::collections::BTreeMap;

use engine::{Value, ValueKind};
use serde::{Deserialize, Serialize};

use crate::definition::{Alignment, ColumnSpec};

// ============================================================================
// HEADERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHeader {
    pub label: String,
    pub field: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub align: Alignment,
    pub width: Option<String>,
    pub wrap: bool,
    pub ellipsis: bool,
}

impl From<&ColumnSpec> for TableHeader {
    fn from(column: &ColumnSpec) -> Self {
        TableHeader {
            label: column.label.clone(),
            field: column.field.clone(),
            kind: column.kind,
            align: column.align,
            width: column.width.clone(),
            wrap: column.wrap,
            ellipsis: column.ellipsis,
        }
    }
}

// ============================================================================
// CELLS AND ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub raw_value: Value,
    pub formatted_value: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub align: Alignment,
}

/// Cells in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> Option<&TableCell> {
        self.cells.get(index)
    }
}

// ============================================================================
// TOTALS AND SUMMARY
// ============================================================================

/// Aggregates over the numerically parseable values of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnTotals {
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSummary {
    pub total_rows: usize,
    pub columns: usize,
    pub numeric_columns: usize,
    pub date_columns: usize,
    pub text_columns: usize,
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableResult {
    pub headers: Vec<TableHeader>,
    pub rows: Vec<TableRow>,
    /// Keyed by column field. Only numeric columns with at least one
    /// numeric value have an entry.
    pub totals: BTreeMap<String, ColumnTotals>,
    pub summary: TableSummary,
    pub row_count: usize,
    pub column_count: usize,
}

impl TableResult {
    /// Index of the first column reading `field`.
    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.field == field)
    }

    /// Cell at `row` for the first column reading `field`.
    pub fn cell(&self, row: usize, field: &str) -> Option<&TableCell> {
        let column = self.column_index(field)?;
        self.rows.get(row)?.cell(column)
    }
}
