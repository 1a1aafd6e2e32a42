//! FILENAME: core/tablix-engine/src/definition.rs
//! Table Definition - The serializable column configuration.
//!
//! A table is described by an ordered list of columns. Each column names
//! the record path it reads, how its values are interpreted, and a few
//! rendering hints that are passed through to the headers untouched.

use engine::ValueKind;
use serde::{Deserialize, Serialize};

/// Pseudo-field that yields the 1-based row number instead of a record value.
pub const ROW_NUMBER_FIELD: &str = "No";

// ============================================================================
// ALIGNMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Left
    }
}

// ============================================================================
// COLUMN SPEC
// ============================================================================

fn default_true() -> bool {
    true
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Label key (resolved to display text by the renderer).
    pub label: String,

    /// Dot-separated record path, or `"No"` for the row number.
    pub field: String,

    #[serde(rename = "type", default)]
    pub kind: ValueKind,

    /// Format hint handed to the formatter (pattern, currency code, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default)]
    pub align: Alignment,

    /// CSS width, e.g. "120px".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,

    #[serde(default = "default_true")]
    pub wrap: bool,

    #[serde(default = "default_true")]
    pub ellipsis: bool,
}

impl ColumnSpec {
    pub fn new(label: impl Into<String>, field: impl Into<String>, kind: ValueKind) -> Self {
        ColumnSpec {
            label: label.into(),
            field: field.into(),
            kind,
            format: None,
            align: Alignment::Left,
            width: None,
            wrap: true,
            ellipsis: true,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    pub fn is_row_number(&self) -> bool {
        self.field == ROW_NUMBER_FIELD
    }
}
