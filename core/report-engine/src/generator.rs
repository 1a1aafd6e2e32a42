//! FILENAME: core/report-engine/src/generator.rs
//! Report Generator - One report request from raw parameters to structured data.
//!
//! The request runs in order: validate parameters, assemble the main pipeline,
//! open one connection, execute, cap the row count, normalize, build the
//! table/pivot/summary, then run subreports on the same connection. The
//! connection is dropped when `generate` returns, on success or error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use engine::{log_debug, log_enter_info, log_exit_info, log_warn};
use engine::{normalize_records, Formatter, Map, ReportError, Value};
use pivot_engine::{transform_pivot, PivotResult};
use query_engine::{assemble_query, validate_parameters, BoundParameters, DataSource};
use serde::{Deserialize, Serialize};
use tablix_engine::{transform_table, TableResult};
use uuid::Uuid;

use crate::config::{self, ReportDefinition, ReportSettings};
use crate::subreport::{SubreportProcessor, SubreportResult, SubreportSummary};
use crate::summary::compute_summary;

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MainData {
    pub records: Vec<Value>,
    pub row_count: usize,

    /// Set when the source returned more than `max_rows_per_table` rows.
    pub truncated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BTreeMap<String, u64>>,
}

/// Everything a renderer needs for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub report_id: Uuid,
    pub report_name: String,
    pub main_data: MainData,
    pub subreports: Vec<SubreportResult>,
    pub subreport_summary: SubreportSummary,
    pub parameters: BoundParameters,
    pub generated_at: DateTime<Utc>,
    pub locale: String,

    /// Non-fatal notes (row truncation, pivot column truncation).
    pub warnings: Vec<String>,
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Holds only shared references, so one generator can serve concurrent
/// requests.
pub struct ReportGenerator<'a> {
    source: &'a dyn DataSource,
    formatter: &'a dyn Formatter,
    settings: ReportSettings,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(source: &'a dyn DataSource, formatter: &'a dyn Formatter, settings: ReportSettings) -> Self {
        ReportGenerator {
            source,
            formatter,
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// Generates `definition` in the default locale.
    pub fn generate(&self, definition: &ReportDefinition, raw_params: &Map) -> Result<ReportData, ReportError> {
        let locale = self.settings.default_locale.clone();
        self.generate_in_locale(definition, raw_params, &locale)
    }

    /// Loads `<reports_dir>/<name>.json` and generates it.
    pub fn generate_by_name(&self, name: &str, raw_params: &Map) -> Result<ReportData, ReportError> {
        let definition = config::load_report_definition(name, &self.settings.reports_dir)?;
        self.generate(&definition, raw_params)
    }

    pub fn list_available_reports(&self) -> Result<Vec<String>, ReportError> {
        config::list_available_reports(&self.settings.reports_dir)
    }

    pub fn generate_in_locale(
        &self,
        definition: &ReportDefinition,
        raw_params: &Map,
        locale: &str,
    ) -> Result<ReportData, ReportError> {
        log_enter_info!("REPORT", "generate", "report={} locale={}", definition.name, locale);

        let result = self.run(definition, raw_params, locale);

        match &result {
            Ok(data) => log_exit_info!(
                "REPORT",
                "generate",
                "report={} rows={} subreports={}",
                data.report_name,
                data.main_data.row_count,
                data.subreports.len()
            ),
            Err(err) => log_exit_info!("REPORT", "generate", "report={} failed in {:?}: {}", definition.name, err.phase(), err),
        }
        result
    }

    fn run(&self, definition: &ReportDefinition, raw_params: &Map, locale: &str) -> Result<ReportData, ReportError> {
        definition.validate()?;

        let parameters = validate_parameters(&definition.parameters, raw_params)?;
        let pipeline = assemble_query(&definition.pipeline, &parameters)?;
        let mut warnings = Vec::new();

        // Released on every return path below
        let mut connection = self.source.connect()?;

        log_debug!("REPORT", "executing main pipeline on '{}'", definition.collection);
        let mut raw = connection.execute(&pipeline, &definition.collection)?;

        let truncated = raw.len() > self.settings.max_rows_per_table;
        if truncated {
            let message = format!(
                "result has {} rows; limited to the first {}",
                raw.len(),
                self.settings.max_rows_per_table
            );
            log_warn!("REPORT", "{}: {}", definition.name, message);
            warnings.push(message);
            raw.truncate(self.settings.max_rows_per_table);
        }

        let records = normalize_records(raw);

        let table = (!definition.columns.is_empty())
            .then(|| transform_table(&records, &definition.columns, self.formatter, locale));

        let pivot = definition
            .pivot
            .as_ref()
            .map(|spec| transform_pivot(&records, &self.settings.cap_pivot(spec)));
        if let Some(pivot) = &pivot {
            warnings.extend(pivot.warnings.iter().map(ToString::to_string));
        }

        let summary = definition
            .summary
            .as_ref()
            .filter(|spec| spec.enabled)
            .map(|spec| compute_summary(&records, spec));

        let processor = SubreportProcessor::new(self.formatter, locale)
            .with_max_pivot_columns(self.settings.max_columns_per_pivot);
        let subreports = processor.process_subreports(
            &definition.subreports,
            &parameters,
            &mut *connection,
            &definition.collection,
        );
        let subreport_summary = SubreportSummary::from_results(&subreports);

        Ok(ReportData {
            report_id: Uuid::new_v4(),
            report_name: definition.name.clone(),
            main_data: MainData {
                row_count: records.len(),
                records,
                truncated,
                table,
                pivot,
                summary,
            },
            subreports,
            subreport_summary,
            parameters,
            generated_at: Utc::now(),
            locale: locale.to_string(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{DataSourceError, DefaultFormatter, ReportPhase};
    use query_engine::{DataConnection, ParameterDefinition, ParameterKind, Pipeline};
    use serde_json::json;

    struct FixedSource {
        rows: usize,
    }

    struct FixedConnection {
        rows: usize,
    }

    impl DataSource for FixedSource {
        fn connect(&self) -> Result<Box<dyn DataConnection + '_>, DataSourceError> {
            Ok(Box::new(FixedConnection { rows: self.rows }))
        }
    }

    impl DataConnection for FixedConnection {
        fn execute(&mut self, _pipeline: &Pipeline, _collection: &str) -> Result<Vec<Value>, DataSourceError> {
            Ok((0..self.rows).map(|i| Value::from(json!({"n": i}))).collect())
        }
    }

    fn params(value: serde_json::Value) -> Map {
        match Value::from(value) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_rows_are_capped_with_warning() {
        let source = FixedSource { rows: 12 };
        let formatter = DefaultFormatter::new();
        let settings = ReportSettings { max_rows_per_table: 10, ..Default::default() };
        let generator = ReportGenerator::new(&source, &formatter, settings);
        let definition = ReportDefinition::new("numbers", "numbers", vec![]);

        let data = generator.generate(&definition, &Map::new()).unwrap();

        assert!(data.main_data.truncated);
        assert_eq!(data.main_data.row_count, 10);
        assert_eq!(data.warnings.len(), 1);
        assert_eq!(data.locale, "en_US");
    }

    #[test]
    fn test_missing_parameter_fails_in_validation() {
        let source = FixedSource { rows: 1 };
        let formatter = DefaultFormatter::new();
        let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());
        let mut definition = ReportDefinition::new("by_year", "numbers", vec![]);
        definition.parameters = vec![ParameterDefinition::new("year", ParameterKind::Integer).required()];

        let err = generator.generate(&definition, &params(json!({}))).unwrap_err();

        assert!(matches!(err, ReportError::MissingParameter(ref name) if name == "year"));
        assert_eq!(err.phase(), ReportPhase::Validation);
    }

    #[test]
    fn test_parameters_are_coerced_into_report_data() {
        let source = FixedSource { rows: 0 };
        let formatter = DefaultFormatter::new();
        let generator = ReportGenerator::new(&source, &formatter, ReportSettings::default());
        let mut definition = ReportDefinition::new(
            "by_year",
            "numbers",
            vec![Value::from(json!({"$match": {"year": "{{year}}"}}))],
        );
        definition.parameters = vec![ParameterDefinition::new("year", ParameterKind::Integer).required()];

        let data = generator.generate_in_locale(&definition, &params(json!({"year": "2024"})), "de_DE").unwrap();

        assert_eq!(data.parameters.get("year"), Some(&Value::Number(2024.0)));
        assert_eq!(data.locale, "de_DE");
        assert!(data.main_data.records.is_empty());
        assert!(data.subreports.is_empty());
    }
}
