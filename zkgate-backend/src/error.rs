//! Normalized backend error taxonomy.
//!
//! Concrete adapters collapse their store's failure modes into
//! [`ErrorKind`]; the protocol layer maps each kind onto a ZooKeeper
//! error code.

use std::fmt;

/// The closed set of failure kinds a backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Anything the adapter could not classify.
    Unknown,
    /// The store cannot express this operation.
    Unimplemented,
    /// The store could not be reached (network / connect / timeout).
    Unreachable,
    /// The key does not exist (or denotes a directory-only node).
    KeyNotFound,
    /// The key already holds a value.
    KeyExists,
    /// A compare-and-swap or compare-and-delete saw a different version.
    BadVersion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Unimplemented => "unimplemented",
            Self::Unreachable => "backend unreachable",
            Self::KeyNotFound => "key not found",
            Self::KeyExists => "key exists",
            Self::BadVersion => "bad version",
        };
        f.write_str(name)
    }
}

/// A backend failure: a normalized kind plus adapter-specific detail.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    kind: ErrorKind,
    message: String,
}

impl BackendError {
    /// Creates an error with explicit detail.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error whose detail is just the kind's name.
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.to_string(),
        }
    }

    /// Wraps a transport-level failure as `Unreachable`.
    #[must_use]
    pub fn unreachable(cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Unreachable, cause.to_string())
    }

    /// The normalized failure kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
