//! FILENAME: core/query-engine/src/lib.rs
//! Query side of the report engine.
//!
//! Turns caller-supplied parameters into a resolved pipeline and runs it
//! through the external data source.
//!
//! Layers:
//! - `parameters`: Parameter definitions and validation/coercion
//! - `assembler`: `{{name}}` token substitution into a descriptor
//! - `pipeline`: The resolved pipeline type plus a stage builder
//! - `source`: Data-source / connection contract

pub mod parameters;
pub mod assembler;
pub mod pipeline;
pub mod source;

pub use parameters::{
    coerce, validate_parameters, BoundParameters, ParameterDefinition, ParameterKind, ParameterValue,
};
pub use assembler::{assemble_query, unresolved_tokens};
pub use pipeline::{date_range_filter, in_filter, text_search_filter, Pipeline, PipelineBuilder};
pub use source::{run_query, DataConnection, DataSource};
