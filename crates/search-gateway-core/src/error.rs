//! Store error kinds.

/// Failure of a single store operation.
///
/// Callers decide whether a kind is fatal; the store never swallows errors
/// into empty results, apart from reads against a missing index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Connection refused, timed out, or otherwise unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The addressed index or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store answered with an error status.
    #[error("store rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The store's response could not be understood.
    #[error("malformed store response: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
