//! FILENAME: core/pivot-engine/src/lib.rs
//! Pivot subsystem of the report engine.
//!
//! Cross-tabulates normalized records into a dense row x column matrix of
//! measure values with totals. Depends on `engine` for the shared value
//! model and path resolution.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot IS)
//! - `cache`: Hashable, ordered keys and accumulators (HOW we group)
//! - `view`: Calculated output (WHAT we return)
//! - `engine`: Calculation engine (HOW we calculate)

pub mod definition;
pub mod cache;
pub mod view;
pub mod engine;

pub use definition::*;
pub use cache::*;
pub use view::*;
pub use crate::engine::{transform_pivot, PivotCalculator};
