//! Error types for orgperm

use thiserror::Error;

/// The main error type for orgperm operations.
///
/// Mutations fail with `Validation` (malformed input) or `NotFound`
/// (reference to a missing entity). Resolution queries never surface either
/// of these; missing data resolves to no access.
#[derive(Debug, Clone, Error)]
pub enum OrgPermError {
    /// Malformed input to a mutation. Nothing was written.
    #[error("validation: {0}")]
    Validation(String),

    /// A mutation or lookup referenced an id that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying LMDB failure.
    #[error("store: {0}")]
    Store(String),
}

/// Result type alias for orgperm operations
pub type Result<T> = std::result::Result<T, OrgPermError>;

/// Convert a storage-layer error to OrgPermError
pub(crate) fn err<E: std::error::Error>(e: E) -> OrgPermError {
    OrgPermError::Store(e.to_string())
}

/// Shorthand for validation failures
pub(crate) fn invalid(msg: impl Into<String>) -> OrgPermError {
    OrgPermError::Validation(msg.into())
}

/// Shorthand for missing-reference failures
pub(crate) fn missing(what: &str, id: u64) -> OrgPermError {
    OrgPermError::NotFound(format!("{} {}", what, id))
}
