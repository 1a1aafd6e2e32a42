//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Shared foundation of the report engine.
//! CONTEXT: Re-exports the dynamic value model, result normalization, value
//! formatting, the error taxonomy and the logging macros used by the query,
//! table, pivot and report crates.

pub mod error;
pub mod format;
pub mod logging;
pub mod normalize;
pub mod value;

// Re-export commonly used types at the crate root
pub use error::{DataSourceError, ReportError, ReportPhase};
pub use format::{parse_iso_datetime, DefaultFormatter, Formatter, ValueKind};
pub use normalize::{normalize_record, normalize_records, resolve_path, resolve_path_or_null};
pub use value::{format_iso_utc, format_plain_number, Map, Value};

pub type Result<T> = std::result::Result<T, ReportError>;
