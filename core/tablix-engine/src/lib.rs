//! FILENAME: core/tablix-engine/src/lib.rs
//! Table subsystem of the report engine.
//!
//! Projects normalized records onto configured columns, formats every
//! cell and computes column totals. It depends on `pivot-engine` for the
//! shared measure accumulator and on `engine` for values and formatting.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the table IS)
//! - `view`: Report-ready output (WHAT we return)
//! - `engine`: Transformation (HOW we build it)
//! - `reshape`: Grouping, sorting and filtering of records ahead of the table

pub mod definition;
pub mod view;
pub mod engine;
pub mod reshape;

pub use definition::*;
pub use view::*;
pub use crate::engine::transform_table;
pub use reshape::{filter_records, group_records, sort_records, FieldAggregation, SortDirection, SortKey};
