//! Error types for document operations.
//!
//! Errors fall into four groups:
//! - structural: the caller misused the API (wrong type, bad path, bad range)
//! - not found: a ticket, key or node that should exist does not
//! - policy: a local update broke the size quota or the schema
//! - merge inconsistency: a remote operation names a parent we never saw

use thiserror::Error;

use crate::crdt::primitives::TimeTicket;

/// Errors returned by the document engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The element is not of the kind the operation needs.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },

    /// A path could not be parsed or does not lead anywhere.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A range whose start lies after its end.
    #[error("invalid range: from {from} is after to {to}")]
    InvalidRange { from: usize, to: usize },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid actor id: {0}")]
    InvalidActorId(String),

    #[error("invalid time ticket: {0}")]
    InvalidTicket(String),

    /// No element was created at the given ticket.
    #[error("element not found: {0}")]
    ElementNotFound(TimeTicket),

    /// No text run or tree node has the given position.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The container targeted by an operation is unknown to this replica.
    #[error("parent not found: {0}")]
    ParentNotFound(TimeTicket),

    #[error("document size exceeded: {size} > {limit}")]
    DocumentSizeExceeded { size: usize, limit: usize },

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("document has been removed")]
    DocumentRemoved,

    #[error("nothing to {0}")]
    EmptyHistory(&'static str),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// The caller asked for something that cannot be done.
    pub fn is_structural(&self) -> bool {
        return matches!(
            self,
            Error::TypeMismatch { .. }
                | Error::InvalidPath(_)
                | Error::InvalidRange { .. }
                | Error::IndexOutOfRange { .. }
                | Error::InvalidActorId(_)
                | Error::InvalidTicket(_)
                | Error::DocumentRemoved
        );
    }

    pub fn is_not_found(&self) -> bool {
        return matches!(self, Error::ElementNotFound(_) | Error::NodeNotFound(_));
    }

    /// Quota or schema rejections of a local update.
    pub fn is_policy(&self) -> bool {
        return matches!(self, Error::DocumentSizeExceeded { .. } | Error::SchemaViolation(_));
    }

    pub fn is_merge_inconsistency(&self) -> bool {
        return matches!(self, Error::ParentNotFound(_));
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
