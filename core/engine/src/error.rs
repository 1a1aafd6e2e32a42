//! FILENAME: core/engine/src/error.rs

use std::fmt;

use thiserror::Error;

/// Opaque error raised by an external data-source executor.
/// The report core never inspects it; it is propagated as-is.
#[derive(Debug)]
pub struct DataSourceError(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for DataSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl DataSourceError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DataSourceError(source.into())
    }

    /// Borrows the executor's original error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync> {
        self.0
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Required parameter '{0}' is missing")]
    MissingParameter(String),

    #[error("Invalid value for parameter '{name}' (expected {expected}): {reason}")]
    InvalidParameterType {
        name: String,
        expected: String,
        reason: String,
    },

    #[error("Pipeline resolution error: {0}")]
    PipelineResolution(String),

    #[error("Subreport '{name}' failed: {reason}")]
    SubreportFailure { name: String, reason: String },

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("Invalid report configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The phase of report generation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Configuration,
    Validation,
    Assembly,
    DataExecution,
    Subreport,
}

impl ReportError {
    pub fn phase(&self) -> ReportPhase {
        match self {
            ReportError::MissingParameter(_) | ReportError::InvalidParameterType { .. } => {
                ReportPhase::Validation
            }
            ReportError::PipelineResolution(_) => ReportPhase::Assembly,
            ReportError::DataSource(_) => ReportPhase::DataExecution,
            ReportError::SubreportFailure { .. } => ReportPhase::Subreport,
            ReportError::Configuration(_) | ReportError::Io(_) => ReportPhase::Configuration,
        }
    }

    pub fn invalid_parameter(
        name: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ReportError::InvalidParameterType {
            name: name.into(),
            expected: expected.into(),
            reason: reason.into(),
        }
    }
}
