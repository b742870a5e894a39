//! Error types for call analysis.

use thiserror::Error;

/// Failures of an analysis run. Cycles, missing implementations and library
/// code are not errors; they shape the graph instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A newer request superseded this one.
    #[error("analysis cancelled")]
    Cancelled,

    /// The symbol index could not answer a query.
    #[error("symbol index unavailable: {0}")]
    Index(#[from] anyhow::Error),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}
