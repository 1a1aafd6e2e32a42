//! FILENAME: core/report-engine/src/lib.rs
//! Report orchestration on top of the query, table and pivot engines.
//!
//! Layers:
//! - `config`: Report definitions (JSON) and process settings
//! - `summary`: Filtered record counts
//! - `subreport`: Context propagation into nested queries
//! - `generator`: One report request end to end

pub mod config;
pub mod summary;
pub mod subreport;
pub mod generator;

pub use config::{
    list_available_reports, load_report_definition, ReportDefinition, ReportInfo, ReportSettings,
};
pub use generator::{MainData, ReportData, ReportGenerator};
pub use subreport::{
    missing_context_parameters, SubreportLine, SubreportProcessor, SubreportResult, SubreportSpec,
    SubreportSummary,
};
pub use summary::{compute_summary, matches_filter, SummaryField, SummaryKind, SummarySpec};
