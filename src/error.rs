//! Failure reporting for the streamed I/O facade.
//!
//! Data-structure operations panic on contract violations; readers and
//! writers never do. They record a [`Status`] instead and turn into sticky
//! no-ops, so callers check `ok()` or the returned booleans and consult
//! `status()` for the reason.

use std::{io, string::String, sync::Arc};

use thiserror::Error;

/// Why a reader or writer stopped working.
///
/// Cheap to clone; I/O causes are shared behind an [`Arc`].
#[derive(Debug, Clone, Error)]
pub enum Status {
    /// A copy exceeded its length budget, or a request would overflow an
    /// internal limit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// An underlying I/O operation failed; the context carries the source
    /// annotation (path and position).
    #[error("{context}: {cause}")]
    Io {
        context: String,
        cause: Arc<io::Error>,
    },
    /// Malformed caller input at the public boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A seek or removal past the current size.
    #[error("out of range: {0}")]
    OutOfRange(String),
    /// An invariant did not hold; never seen by well-formed programs.
    #[error("internal: {0}")]
    Internal(String),
}

impl Status {
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    pub fn io(context: impl Into<String>, cause: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            cause: Arc::new(cause),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The underlying I/O error, if this is an I/O status.
    pub fn io_cause(&self) -> Option<&io::Error> {
        match self {
            Self::Io { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Prefixes the status with additional context.
    pub fn annotate(self, note: impl core::fmt::Display) -> Self {
        match self {
            Self::ResourceExhausted(message) => {
                Self::ResourceExhausted(std::format!("{note}: {message}"))
            }
            Self::Io { context, cause } => Self::Io {
                context: std::format!("{note}: {context}"),
                cause,
            },
            Self::InvalidArgument(message) => {
                Self::InvalidArgument(std::format!("{note}: {message}"))
            }
            Self::OutOfRange(message) => Self::OutOfRange(std::format!("{note}: {message}")),
            Self::Internal(message) => Self::Internal(std::format!("{note}: {message}")),
        }
    }
}
