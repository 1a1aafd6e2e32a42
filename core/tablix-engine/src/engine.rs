//! FILENAME: core/tablix-engine/src/engine.rs
//! Table Engine - Projects records onto configured columns.
//!
//! For every record and column the field path is resolved (a missing
//! path gives a null cell), the value is formatted through the caller's
//! formatter, and numeric columns feed their totals.

use std::collections::BTreeMap;

use engine::{log_debug, log_warn};
use engine::{resolve_path_or_null, Formatter, Value, ValueKind};
use pivot_engine::{AggregationType, MeasureAccumulator};

use crate::definition::ColumnSpec;
use crate::view::{ColumnTotals, TableCell, TableHeader, TableResult, TableRow, TableSummary};

/// Builds a formatted table from normalized records. Row order follows
/// record order. Never fails.
pub fn transform_table(
    records: &[Value],
    columns: &[ColumnSpec],
    formatter: &dyn Formatter,
    locale: &str,
) -> TableResult {
    let headers: Vec<TableHeader> = columns.iter().map(TableHeader::from).collect();
    let rows: Vec<TableRow> = records
        .iter()
        .enumerate()
        .map(|(index, record)| build_row(record, index + 1, columns, formatter, locale))
        .collect();

    let totals = calculate_totals(records, columns);
    let summary = summarize(records.len(), columns);

    log_debug!(
        "TABLE",
        "transformed {} records into {} columns ({} with totals)",
        records.len(),
        columns.len(),
        totals.len()
    );

    TableResult {
        headers,
        row_count: rows.len(),
        column_count: columns.len(),
        rows,
        totals,
        summary,
    }
}

fn build_row(
    record: &Value,
    row_number: usize,
    columns: &[ColumnSpec],
    formatter: &dyn Formatter,
    locale: &str,
) -> TableRow {
    let cells = columns
        .iter()
        .map(|column| {
            let raw_value = if column.is_row_number() {
                Value::Number(row_number as f64)
            } else {
                resolve_path_or_null(record, &column.field).clone()
            };
            let formatted_value = formatter.format(&raw_value, column.kind, locale, column.format.as_deref());
            TableCell {
                raw_value,
                formatted_value,
                kind: column.kind,
                align: column.align,
            }
        })
        .collect();

    TableRow { cells }
}

/// Per-column sum/avg/min/max/count for number and currency columns.
/// Keyed by field path; when two columns share a field the first one keeps
/// the entry.
fn calculate_totals(records: &[Value], columns: &[ColumnSpec]) -> BTreeMap<String, ColumnTotals> {
    let mut totals = BTreeMap::new();

    for column in columns.iter().filter(|c| c.kind.is_numeric()) {
        let mut acc = MeasureAccumulator::new();
        for (index, record) in records.iter().enumerate() {
            let value = if column.is_row_number() {
                Some((index + 1) as f64)
            } else {
                resolve_path_or_null(record, &column.field).to_number()
            };
            if let Some(n) = value {
                acc.add(n);
            }
        }

        if acc.is_empty() {
            continue;
        }
        if totals.contains_key(&column.field) {
            log_warn!("TABLE", "column '{}' repeats field '{}'; totals kept from the first", column.label, column.field);
            continue;
        }
        totals.insert(
            column.field.clone(),
            ColumnTotals {
                sum: acc.compute(AggregationType::Sum),
                avg: acc.compute(AggregationType::Avg),
                min: acc.compute(AggregationType::Min),
                max: acc.compute(AggregationType::Max),
                count: acc.count,
            },
        );
    }

    totals
}

fn summarize(total_rows: usize, columns: &[ColumnSpec]) -> TableSummary {
    TableSummary {
        total_rows,
        columns: columns.len(),
        numeric_columns: columns.iter().filter(|c| c.kind.is_numeric()).count(),
        date_columns: columns.iter().filter(|c| c.kind.is_temporal()).count(),
        text_columns: columns.iter().filter(|c| c.kind == ValueKind::String).count(),
    }
}
