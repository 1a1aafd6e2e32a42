//! FILENAME: core/report-engine/src/subreport.rs
//! Subreports - Secondary queries run inside the parent report request.
//!
//! Each subreport inherits a declared subset of the parent's validated
//! parameters, resolves its own pipeline with them and runs on the same
//! connection as the main query. A failing subreport never aborts the
//! report: it is returned with an error message and no rows.

use engine::{log_debug, log_info, log_warn};
use engine::{Formatter, Map, ReportError, Value};
use pivot_engine::{transform_pivot, PivotResult, PivotSpec};
use query_engine::{run_query, BoundParameters, DataConnection};
use serde::{Deserialize, Serialize};
use tablix_engine::{transform_table, ColumnSpec, TableResult};

// ============================================================================
// DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubreportSpec {
    pub name: String,

    /// Opaque template reference, passed through to the result.
    #[serde(default)]
    pub template: String,

    /// Pipeline descriptor; may reference `{{name}}` for inherited parameters.
    #[serde(default)]
    pub pipeline: Vec<Value>,

    /// Names of parent parameters this subreport inherits.
    #[serde(default)]
    pub context_params: Vec<String>,

    #[serde(default)]
    pub page_break_before: bool,

    #[serde(default)]
    pub page_break_after: bool,

    /// Collection override; the parent collection is used when absent.
    #[serde(default)]
    pub collection: Option<String>,

    #[serde(default)]
    pub columns: Vec<ColumnSpec>,

    #[serde(default)]
    pub pivot: Option<PivotSpec>,
}

impl SubreportSpec {
    pub fn new(name: impl Into<String>, pipeline: Vec<Value>) -> Self {
        SubreportSpec {
            name: name.into(),
            template: String::new(),
            pipeline,
            context_params: Vec::new(),
            page_break_before: false,
            page_break_after: false,
            collection: None,
            columns: Vec::new(),
            pivot: None,
        }
    }

    pub fn with_context(mut self, names: &[&str]) -> Self {
        self.context_params = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubreportResult {
    pub name: String,
    pub template: String,
    pub data: Vec<Value>,

    /// The parameters actually inherited (missing ones are absent).
    pub context_params: Map,

    pub row_count: usize,
    pub page_break_before: bool,
    pub page_break_after: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubreportResult {
    fn failed(spec: &SubreportSpec, context: &BoundParameters, error: &ReportError) -> Self {
        SubreportResult {
            name: spec.name.clone(),
            template: spec.template.clone(),
            data: Vec::new(),
            context_params: context.to_map(),
            row_count: 0,
            page_break_before: spec.page_break_before,
            page_break_after: spec.page_break_after,
            table: None,
            pivot: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Runs subreports with the request's formatter and locale.
pub struct SubreportProcessor<'a> {
    formatter: &'a dyn Formatter,
    locale: String,
    max_pivot_columns: Option<usize>,
}

impl<'a> SubreportProcessor<'a> {
    pub fn new(formatter: &'a dyn Formatter, locale: impl Into<String>) -> Self {
        SubreportProcessor {
            formatter,
            locale: locale.into(),
            max_pivot_columns: None,
        }
    }

    /// Caps every subreport pivot at `max` columns.
    pub fn with_max_pivot_columns(mut self, max: usize) -> Self {
        self.max_pivot_columns = Some(max);
        self
    }

    /// Processes `specs` in order. The result list always has one entry
    /// per spec.
    pub fn process_subreports(
        &self,
        specs: &[SubreportSpec],
        parent_context: &BoundParameters,
        connection: &mut dyn DataConnection,
        default_collection: &str,
    ) -> Vec<SubreportResult> {
        let results: Vec<SubreportResult> = specs
            .iter()
            .map(|spec| self.process_subreport(spec, parent_context, connection, default_collection))
            .collect();

        log_info!(
            "SUBREPORT",
            "processed {} subreports ({} failed)",
            results.len(),
            results.iter().filter(|r| !r.is_success()).count()
        );
        results
    }

    pub fn process_subreport(
        &self,
        spec: &SubreportSpec,
        parent_context: &BoundParameters,
        connection: &mut dyn DataConnection,
        default_collection: &str,
    ) -> SubreportResult {
        let (context, missing) = parent_context.subset(&spec.context_params);
        for name in &missing {
            log_warn!(
                "SUBREPORT",
                "context parameter '{}' not available for subreport '{}'",
                name,
                spec.name
            );
        }

        let collection = spec.collection.as_deref().unwrap_or(default_collection);
        log_debug!(
            "SUBREPORT",
            "running '{}' on '{}' with {} inherited parameters",
            spec.name,
            collection,
            context.len()
        );

        let data = match run_query(connection, &spec.pipeline, &context, collection) {
            Ok(data) => data,
            Err(err) => {
                let failure = ReportError::SubreportFailure {
                    name: spec.name.clone(),
                    reason: err.to_string(),
                };
                log_warn!("SUBREPORT", "{}", failure);
                return SubreportResult::failed(spec, &context, &failure);
            }
        };

        let table = (!spec.columns.is_empty())
            .then(|| transform_table(&data, &spec.columns, self.formatter, &self.locale));

        let pivot = spec.pivot.as_ref().map(|pivot_spec| {
            let capped = self.cap_pivot(pivot_spec);
            transform_pivot(&data, &capped)
        });

        SubreportResult {
            name: spec.name.clone(),
            template: spec.template.clone(),
            row_count: data.len(),
            data,
            context_params: context.to_map(),
            page_break_before: spec.page_break_before,
            page_break_after: spec.page_break_after,
            table,
            pivot,
            error: None,
        }
    }

    fn cap_pivot(&self, spec: &PivotSpec) -> PivotSpec {
        match self.max_pivot_columns {
            Some(max) if spec.max_columns > max => spec.clone().with_max_columns(max),
            _ => spec.clone(),
        }
    }
}

/// Context names declared by `spec` that `parent` does not provide.
pub fn missing_context_parameters(spec: &SubreportSpec, parent: &BoundParameters) -> Vec<String> {
    spec.context_params
        .iter()
        .filter(|name| !parent.contains(name))
        .cloned()
        .collect()
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubreportLine {
    pub name: String,
    pub row_count: usize,
    pub has_error: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubreportSummary {
    pub total_subreports: usize,
    pub successful_subreports: usize,
    pub failed_subreports: usize,
    pub total_rows: usize,
    pub subreports: Vec<SubreportLine>,
}

impl SubreportSummary {
    pub fn from_results(results: &[SubreportResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_success()).count();
        SubreportSummary {
            total_subreports: results.len(),
            successful_subreports: results.len() - failed,
            failed_subreports: failed,
            total_rows: results.iter().map(|r| r.row_count).sum(),
            subreports: results
                .iter()
                .map(|r| SubreportLine {
                    name: r.name.clone(),
                    row_count: r.row_count,
                    has_error: r.error.is_some(),
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}
