//! FILENAME: core/report-engine/src/summary.rs
//! Summary fields - Record counts shown in a report's summary block.
//!
//! Filter syntax is `path:condition`:
//!   `status:!=`        path present and not empty
//!   `status:=open`     string form equals `open`
//!   `status:!=closed`  string form differs from `closed`
//!   `status:open`      same as `=open`
//! A filter without `:` matches every record.

use std::collections::BTreeMap;

use engine::{resolve_path_or_null, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    #[default]
    Count,
    Sum,
    Avg,
    Min,
    Max,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryField {
    pub name: String,

    #[serde(default)]
    pub label_key: String,

    #[serde(rename = "type", default)]
    pub kind: SummaryKind,

    #[serde(default)]
    pub filter: Option<String>,
}

impl SummaryField {
    pub fn count(name: impl Into<String>, filter: Option<&str>) -> Self {
        SummaryField {
            name: name.into(),
            label_key: String::new(),
            kind: SummaryKind::Count,
            filter: filter.map(str::to_string),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub fields: Vec<SummaryField>,
}

/// One summary value per field name. Only `count` honours its filter;
/// every other kind reports the plain record count.
pub fn compute_summary(records: &[Value], spec: &SummarySpec) -> BTreeMap<String, u64> {
    spec.fields
        .iter()
        .map(|field| {
            let count = match (field.kind, field.filter.as_deref()) {
                (SummaryKind::Count, Some(filter)) if !filter.is_empty() => {
                    records.iter().filter(|r| matches_filter(r, filter)).count()
                }
                _ => records.len(),
            };
            (field.name.clone(), count as u64)
        })
        .collect()
}

/// Evaluates one `path:condition` filter against a record.
pub fn matches_filter(record: &Value, filter: &str) -> bool {
    let Some((path, condition)) = filter.split_once(':') else {
        return true;
    };

    let value = resolve_path_or_null(record, path);

    if condition == "!=" {
        return !value.is_null() && value.as_str() != Some("");
    }

    let text = value.display_string();
    if let Some(expected) = condition.strip_prefix('=') {
        text == expected
    } else if let Some(rejected) = condition.strip_prefix("!=") {
        text != rejected
    } else {
        text == condition
    }
}
