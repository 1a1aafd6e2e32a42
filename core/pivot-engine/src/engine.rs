//! FILENAME: core/pivot-engine/src/engine.rs
//! Pivot Engine - Cross-tabulates normalized records.
//!
//! Algorithm:
//! 1. Build each record's row and column key
//! 2. Collect and sort the distinct keys per axis
//! 3. Truncate the column axis to `max_columns`
//! 4. Accumulate every measure into its (row, column) cell
//! 5. Finalize cells (deferred average division)
//! 6. Row, column and grand totals
//! 7. Labels and summary

use engine::{log_debug, log_warn};
use engine::{resolve_path, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::{DimensionKey, MeasureAccumulator};
use crate::definition::PivotSpec;
use crate::view::{MeasureSummary, MeasureValues, PivotResult, PivotSummary, PivotWarning};

/// Keys of one record on both axes; `None` when the record has no key there.
type RecordKeys = (Option<DimensionKey>, Option<DimensionKey>);

/// Executes one pivot calculation over a borrowed record set.
pub struct PivotCalculator<'a> {
    records: &'a [Value],
    spec: &'a PivotSpec,

    /// Per-record keys, index-aligned with `records`.
    record_keys: Vec<RecordKeys>,

    row_keys: Vec<DimensionKey>,
    column_keys: Vec<DimensionKey>,

    /// Flattened `[row][column][measure]` accumulators.
    accumulators: Vec<MeasureAccumulator>,

    warnings: Vec<PivotWarning>,
}

impl<'a> PivotCalculator<'a> {
    pub fn new(records: &'a [Value], spec: &'a PivotSpec) -> Self {
        PivotCalculator {
            records,
            spec,
            record_keys: Vec::new(),
            row_keys: Vec::new(),
            column_keys: Vec::new(),
            accumulators: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Executes the full calculation and returns the result.
    pub fn calculate(mut self) -> PivotResult {
        // Step 1: Key every record on both axes
        self.build_record_keys();

        // Step 2: Distinct, sorted axis keys
        self.row_keys = self.distinct_sorted(|keys| keys.0.as_ref());
        self.column_keys = self.distinct_sorted(|keys| keys.1.as_ref());

        // Step 3: Column cap
        self.truncate_columns();

        // Step 4: Accumulate measures into cells
        self.accumulate();

        // Step 5: Finalize the dense matrix
        let cells = self.finalize_cells();

        // Step 6: Totals
        let (row_totals, column_totals, grand_totals) = self.compute_totals(&cells);

        // Step 7: Labels and summary
        let summary = self.build_summary(&cells);

        log_debug!(
            "PIVOT",
            "calculated {} x {} pivot with {} measures",
            self.row_keys.len(),
            self.column_keys.len(),
            self.spec.measures.len()
        );

        PivotResult {
            row_labels: self.row_keys.iter().map(DimensionKey::label).collect(),
            column_labels: self.column_keys.iter().map(DimensionKey::label).collect(),
            row_keys: self.row_keys,
            column_keys: self.column_keys,
            measures: self.spec.measure_names(),
            cells,
            row_totals,
            column_totals,
            grand_totals,
            warnings: self.warnings,
            summary,
        }
    }

    fn build_record_keys(&mut self) {
        self.record_keys = self
            .records
            .iter()
            .map(|record| {
                (
                    DimensionKey::from_record(record, &self.spec.rows),
                    DimensionKey::from_record(record, &self.spec.columns),
                )
            })
            .collect();
    }

    fn distinct_sorted<F>(&self, axis: F) -> Vec<DimensionKey>
    where
        F: Fn(&RecordKeys) -> Option<&DimensionKey>,
    {
        let mut seen: FxHashSet<&DimensionKey> = FxHashSet::default();
        let mut keys: Vec<DimensionKey> = Vec::new();
        for record_keys in &self.record_keys {
            if let Some(key) = axis(record_keys) {
                if seen.insert(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys.sort();
        keys
    }

    fn truncate_columns(&mut self) {
        let distinct = self.column_keys.len();
        if distinct > self.spec.max_columns {
            self.column_keys.truncate(self.spec.max_columns);
            let warning = PivotWarning::ColumnsTruncated {
                distinct,
                retained: self.spec.max_columns,
            };
            log_warn!("PIVOT", "{}", warning);
            self.warnings.push(warning);
        }
    }

    fn accumulate(&mut self) {
        let measure_count = self.spec.measures.len();
        let column_count = self.column_keys.len();
        self.accumulators = vec![MeasureAccumulator::new(); self.row_keys.len() * column_count * measure_count];

        let row_index: FxHashMap<&DimensionKey, usize> =
            self.row_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let column_index: FxHashMap<&DimensionKey, usize> =
            self.column_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

        for (record, (row_key, column_key)) in self.records.iter().zip(&self.record_keys) {
            // Records outside either retained axis are excluded from the matrix
            let (Some(r), Some(c)) = (
                row_key.as_ref().and_then(|k| row_index.get(k).copied()),
                column_key.as_ref().and_then(|k| column_index.get(k).copied()),
            ) else {
                continue;
            };

            let base = (r * column_count + c) * measure_count;
            for (m, measure) in self.spec.measures.iter().enumerate() {
                // Non-numeric measure values are skipped for this record
                if let Some(value) = resolve_path(record, &measure.field).and_then(Value::to_number) {
                    self.accumulators[base + m].add(value);
                }
            }
        }
    }

    fn finalize_cells(&self) -> Vec<Vec<MeasureValues>> {
        let measure_count = self.spec.measures.len();
        let column_count = self.column_keys.len();

        (0..self.row_keys.len())
            .map(|r| {
                (0..column_count)
                    .map(|c| {
                        let base = (r * column_count + c) * measure_count;
                        self.spec
                            .measures
                            .iter()
                            .enumerate()
                            .map(|(m, measure)| {
                                (measure.name.clone(), self.accumulators[base + m].compute(measure.aggregation))
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    fn zero_values(&self) -> MeasureValues {
        self.spec.measures.iter().map(|m| (m.name.clone(), 0.0)).collect()
    }

    /// Totals are straight sums of finalized cell values for every
    /// aggregation kind, averages included.
    fn compute_totals(
        &self,
        cells: &[Vec<MeasureValues>],
    ) -> (Vec<MeasureValues>, Vec<MeasureValues>, Option<MeasureValues>) {
        if !self.spec.show_totals {
            return (Vec::new(), Vec::new(), None);
        }

        let mut row_totals = vec![self.zero_values(); self.row_keys.len()];
        let mut column_totals = vec![self.zero_values(); self.column_keys.len()];
        let mut grand = self.zero_values();

        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                for (name, value) in cell {
                    add_to(&mut row_totals[r], name, *value);
                    add_to(&mut column_totals[c], name, *value);
                    add_to(&mut grand, name, *value);
                }
            }
        }

        let grand_totals = self.spec.show_grand_total.then_some(grand);
        (row_totals, column_totals, grand_totals)
    }

    fn build_summary(&self, cells: &[Vec<MeasureValues>]) -> PivotSummary {
        let mut summary = PivotSummary {
            total_rows: self.row_keys.len(),
            total_columns: self.column_keys.len(),
            cell_count: self.row_keys.len() * self.column_keys.len(),
            ..PivotSummary::default()
        };

        for measure in &self.spec.measures {
            let mut acc = MeasureAccumulator::new();
            for value in cells.iter().flatten().filter_map(|cell| cell.get(&measure.name)) {
                if *value != 0.0 {
                    acc.add(*value);
                }
            }
            if acc.is_empty() {
                continue;
            }
            summary.measures.insert(
                measure.name.clone(),
                MeasureSummary {
                    aggregation: measure.aggregation,
                    total: acc.sum,
                    average: acc.sum / acc.count as f64,
                    min: acc.min.unwrap_or(0.0),
                    max: acc.max.unwrap_or(0.0),
                    count: acc.count as usize,
                },
            );
        }

        summary
    }
}

fn add_to(values: &mut MeasureValues, name: &str, value: f64) {
    if let Some(total) = values.get_mut(name) {
        *total += value;
    }
}

/// Cross-tabulates `records` according to `spec`.
///
/// Never fails: records without a key on an axis are left out of the
/// matrix, non-numeric measure values are skipped, and an oversized
/// column axis is truncated with a warning. Call [`PivotSpec::validate`]
/// on untrusted definitions first.
pub fn transform_pivot(records: &[Value], spec: &PivotSpec) -> PivotResult {
    PivotCalculator::new(records, spec).calculate()
}
