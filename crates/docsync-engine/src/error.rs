//! Error types for the engine

use thiserror::Error;

/// Everything that can abort a commit or reject input.
///
/// None of these are retried or repaired inside the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operations do not partition the old/new sequence consistently
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// The transaction's old side does not match the live linear data
    #[error("Stale transaction at offset {offset}: {reason}")]
    StaleTransaction { offset: usize, reason: String },

    /// Content would end up somewhere the node kinds do not allow, or markers
    /// would stop balancing
    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    /// The tree modifier's cursors no longer agree with the tree
    #[error("Cursor divergence: {0}")]
    CursorDivergence(String),

    /// Linear data is not a valid tree linearization
    #[error("Malformed document at offset {offset}: {reason}")]
    MalformedDocument { offset: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub(crate) fn stale(offset: usize, reason: impl Into<String>) -> Self {
        EngineError::StaleTransaction {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn divergence(reason: impl Into<String>) -> Self {
        EngineError::CursorDivergence(reason.into())
    }

    pub(crate) fn malformed_document(offset: usize, reason: impl Into<String>) -> Self {
        EngineError::MalformedDocument {
            offset,
            reason: reason.into(),
        }
    }
}
