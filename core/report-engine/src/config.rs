//! FILENAME: core/report-engine/src/config.rs
//! PURPOSE: Report definitions loaded from JSON files, and process settings.
//! CONTEXT: A report definition bundles the main pipeline, its parameter
//! declarations, the table/pivot/summary layout and any subreports. Problems
//! found while loading are configuration errors; they never surface as
//! transformation errors later on.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use engine::{log_debug, log_warn};
use engine::{ReportError, Value};
use pivot_engine::PivotSpec;
use query_engine::{unresolved_tokens, ParameterDefinition};
use serde::{Deserialize, Serialize};
use tablix_engine::ColumnSpec;

use crate::subreport::SubreportSpec;
use crate::summary::SummarySpec;

// ============================================================================
// REPORT DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub collection: String,

    pub pipeline: Vec<Value>,

    /// Opaque template reference for the renderer.
    #[serde(default)]
    pub template: String,

    #[serde(default)]
    pub columns: Vec<ColumnSpec>,

    #[serde(default)]
    pub pivot: Option<PivotSpec>,

    #[serde(default)]
    pub summary: Option<SummarySpec>,

    #[serde(default)]
    pub subreports: Vec<SubreportSpec>,

    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,

    #[serde(default)]
    pub css_file: Option<String>,
}

impl ReportDefinition {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, pipeline: Vec<Value>) -> Self {
        ReportDefinition {
            name: name.into(),
            description: String::new(),
            collection: collection.into(),
            pipeline,
            template: String::new(),
            columns: Vec::new(),
            pivot: None,
            summary: None,
            subreports: Vec::new(),
            parameters: Vec::new(),
            css_file: None,
        }
    }

    /// Parses and validates a definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ReportError> {
        let definition: ReportDefinition = serde_json::from_str(text)
            .map_err(|e| ReportError::Configuration(format!("invalid report definition: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural checks that do not depend on request parameters.
    pub fn validate(&self) -> Result<(), ReportError> {
        check_stages(&self.name, &self.pipeline)?;
        check_columns(&self.name, &self.columns)?;

        let mut seen = BTreeSet::new();
        for definition in &self.parameters {
            if !seen.insert(definition.name.as_str()) {
                return Err(ReportError::Configuration(format!(
                    "report '{}': parameter '{}' is declared more than once",
                    self.name, definition.name
                )));
            }
        }

        for token in unresolved_tokens(&self.pipeline) {
            if !seen.contains(token.as_str()) {
                return Err(ReportError::Configuration(format!(
                    "report '{}': pipeline references undeclared parameter '{}'",
                    self.name, token
                )));
            }
        }

        if let Some(pivot) = &self.pivot {
            pivot.validate()?;
        }

        let mut subreport_names = BTreeSet::new();
        for subreport in &self.subreports {
            if !subreport_names.insert(subreport.name.as_str()) {
                return Err(ReportError::Configuration(format!(
                    "report '{}': subreport '{}' is defined more than once",
                    self.name, subreport.name
                )));
            }
            check_stages(&subreport.name, &subreport.pipeline)?;
            check_columns(&subreport.name, &subreport.columns)?;
            if let Some(pivot) = &subreport.pivot {
                pivot.validate()?;
            }

            // Unbound subreport tokens only fail that subreport at run time
            for token in unresolved_tokens(&subreport.pipeline) {
                if !subreport.context_params.contains(&token) {
                    log_warn!(
                        "CONFIG",
                        "subreport '{}' references '{}' which is not in its context parameters",
                        subreport.name,
                        token
                    );
                }
            }
        }

        Ok(())
    }

    pub fn info(&self) -> ReportInfo {
        ReportInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            collection: self.collection.clone(),
            parameters: self.parameters.clone(),
            subreports: self.subreports.iter().map(|s| s.name.clone()).collect(),
            has_pivot: self.pivot.is_some(),
            has_table: !self.columns.is_empty(),
        }
    }
}

fn check_stages(owner: &str, pipeline: &[Value]) -> Result<(), ReportError> {
    match pipeline.iter().position(|stage| stage.as_object().is_none()) {
        Some(index) => Err(ReportError::Configuration(format!(
            "'{}': pipeline stage {} must be a mapping",
            owner, index
        ))),
        None => Ok(()),
    }
}

/// Table totals are keyed by field, so each field may back one column only.
fn check_columns(owner: &str, columns: &[ColumnSpec]) -> Result<(), ReportError> {
    let mut fields = BTreeSet::new();
    for column in columns {
        if !fields.insert(column.field.as_str()) {
            return Err(ReportError::Configuration(format!(
                "'{}': field '{}' is used by more than one column",
                owner, column.field
            )));
        }
    }
    Ok(())
}

/// Descriptive view of a definition for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub name: String,
    pub description: String,
    pub collection: String,
    pub parameters: Vec<ParameterDefinition>,
    pub subreports: Vec<String>,
    pub has_pivot: bool,
    pub has_table: bool,
}

// ============================================================================
// LOADING
// ============================================================================

/// Loads `<reports_dir>/<name>.json`.
pub fn load_report_definition(name: &str, reports_dir: &Path) -> Result<ReportDefinition, ReportError> {
    let path = reports_dir.join(format!("{}.json", name));
    if !path.exists() {
        return Err(ReportError::Configuration(format!(
            "report configuration not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(&path)?;
    let definition = ReportDefinition::from_json_str(&content)?;
    log_debug!("CONFIG", "loaded report '{}' from {}", definition.name, path.display());
    Ok(definition)
}

/// Sorted names of every `*.json` definition in `reports_dir`.
/// A missing directory lists nothing.
pub fn list_available_reports(reports_dir: &Path) -> Result<Vec<String>, ReportError> {
    if !reports_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(reports_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

// ============================================================================
// SETTINGS
// ============================================================================

pub const DEFAULT_REPORTS_DIR: &str = "reports";
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_MAX_ROWS_PER_TABLE: usize = 100_000;
pub const DEFAULT_MAX_COLUMNS_PER_PIVOT: usize = 200;

/// Process-level limits and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub reports_dir: PathBuf,
    pub default_locale: String,
    pub max_rows_per_table: usize,
    pub max_columns_per_pivot: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            default_locale: DEFAULT_LOCALE.to_string(),
            max_rows_per_table: DEFAULT_MAX_ROWS_PER_TABLE,
            max_columns_per_pivot: DEFAULT_MAX_COLUMNS_PER_PIVOT,
        }
    }
}

impl ReportSettings {
    /// Defaults overridden by `REPORTS_DIR`, `REPORT_LOCALE`,
    /// `MAX_ROWS_PER_TABLE` and `MAX_COLUMNS_PER_PIVOT`.
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = ReportSettings::default();

        if let Some(dir) = lookup("REPORTS_DIR") {
            settings.reports_dir = PathBuf::from(dir);
        }
        if let Some(locale) = lookup("REPORT_LOCALE") {
            settings.default_locale = locale;
        }
        if let Some(raw) = lookup("MAX_ROWS_PER_TABLE") {
            settings.max_rows_per_table = parse_limit("MAX_ROWS_PER_TABLE", &raw)?;
        }
        if let Some(raw) = lookup("MAX_COLUMNS_PER_PIVOT") {
            settings.max_columns_per_pivot = parse_limit("MAX_COLUMNS_PER_PIVOT", &raw)?;
        }

        Ok(settings)
    }

    /// Copy of `spec` whose column cap does not exceed the process maximum.
    pub fn cap_pivot(&self, spec: &PivotSpec) -> PivotSpec {
        let mut capped = spec.clone();
        capped.max_columns = capped.max_columns.min(self.max_columns_per_pivot);
        capped
    }
}

fn parse_limit(key: &str, raw: &str) -> Result<usize, ReportError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ReportError::Configuration(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}
