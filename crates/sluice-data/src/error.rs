//! Data layer errors.

use sluice_core::RenderError;

/// Error produced by a data source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("{0}")]
    Failed(String),

    #[error("Data source dropped before resolving")]
    Dropped,
}

impl DataError {
    /// Create a failure from any displayable error.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<DataError> for RenderError {
    fn from(err: DataError) -> Self {
        RenderError::Data(err.to_string())
    }
}
