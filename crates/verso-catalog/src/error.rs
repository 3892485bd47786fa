//! Error types for catalog operations.
//!
//! One variant per failure kind; intermediate layers never collapse one kind
//! into another, and the transactional store rolls back automatically on any
//! error. `Internal` is terminal: nothing re-surfaces it as another kind.

use thiserror::Error;

use crate::diff::Conflict;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reference, path, row, or policy does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Unique-key conflict (repository or branch already exists).
    #[error("already exists: {what}")]
    AlreadyExists {
        /// The conflicting key.
        what: String,
    },

    /// A reference string could not be parsed.
    #[error("invalid reference '{reference}': {message}")]
    InvalidReference {
        /// The offending reference string.
        reference: String,
        /// Why it was rejected.
        message: String,
    },

    /// A path failed validation.
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Why the path was rejected.
        message: String,
    },

    /// A commit reference is malformed or does not belong to the branch.
    #[error("invalid commit: {message}")]
    InvalidCommit {
        /// Why the commit was rejected.
        message: String,
    },

    /// Commit attempted with no uncommitted rows on the branch.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The merge produced conflicts; no rows were changed.
    #[error("merge conflict on {} path(s)", conflicts.len())]
    MergeConflict {
        /// The conflicting paths.
        conflicts: Vec<Conflict>,
    },

    /// The two references share no common ancestor.
    #[error("no merge base between references")]
    NoMergeBase,

    /// The entry has been marked expired and the caller did not opt in.
    #[error("entry is expired")]
    Expired,

    /// The subject is not authenticated for this catalog.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Why the request was rejected.
        reason: String,
    },

    /// The subject lacks a required permission.
    #[error("insufficient permissions: {reason}")]
    InsufficientPermissions {
        /// Which permission was missing.
        reason: String,
    },

    /// Serialization failure in the transactional store; the caller should
    /// retry the whole operation.
    #[error("transaction conflict, retry")]
    Conflict,

    /// The operation was aborted through its cancellation handle before the
    /// transaction committed.
    #[error("operation cancelled")]
    Cancelled,

    /// A transactional-store deadline expired. Streaming callers may resume
    /// from the last returned position token.
    #[error("store timeout")]
    Timeout,

    /// Anything else. Never re-surfaced as another kind.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl CatalogError {
    /// Creates a not-found error for a named object.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an already-exists error for a named key.
    #[must_use]
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<verso_core::Error> for CatalogError {
    fn from(err: verso_core::Error) -> Self {
        match err {
            verso_core::Error::Cancelled => Self::Cancelled,
            verso_core::Error::NotFound(what) => Self::NotFound { what },
            verso_core::Error::InvalidName { message } => Self::Internal {
                message: format!("unvalidated name reached the catalog: {message}"),
            },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}
