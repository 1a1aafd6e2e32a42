//! FILENAME: core/query-engine/src/source.rs
//! PURPOSE: Contract with the external data-source executor.
//! CONTEXT: The core never talks to a database directly. A `DataSource` hands
//! out one `DataConnection` per report request; the connection is released
//! when it is dropped, so every exit path of a request gives it back.

use engine::{log_debug, log_info};
use engine::{normalize_records, DataSourceError, ReportError, Value};

use crate::assembler::assemble_query;
use crate::parameters::BoundParameters;
use crate::pipeline::Pipeline;

/// Factory for per-request connections.
pub trait DataSource: Send + Sync {
    fn connect(&self) -> Result<Box<dyn DataConnection + '_>, DataSourceError>;
}

/// A live connection. Implementations release their resources in `Drop`.
pub trait DataConnection {
    /// Runs a resolved pipeline against `collection` and returns the raw records.
    fn execute(&mut self, pipeline: &Pipeline, collection: &str) -> Result<Vec<Value>, DataSourceError>;
}

/// Assembles `descriptor`, executes it and normalizes the result.
/// Assembly errors and data-source errors are returned unchanged.
pub fn run_query(
    connection: &mut dyn DataConnection,
    descriptor: &[Value],
    params: &BoundParameters,
    collection: &str,
) -> Result<Vec<Value>, ReportError> {
    let pipeline = assemble_query(descriptor, params)?;
    log_debug!("QUERY", "executing {} stages on '{}'", pipeline.len(), collection);

    let raw = connection.execute(&pipeline, collection)?;
    let records = normalize_records(raw);

    log_info!("QUERY", "query on '{}' returned {} records", collection, records.len());
    Ok(records)
}
