//! Crate-level error type
//!
//! Store primitives return [`RepositoryError`](crate::repository::RepositoryError)
//! directly; this enum wraps it together with configuration, I/O and startup
//! failures for application code that touches several layers.

use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryErrorKind};

/// Result type alias using the crate Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (pool setup, tracing setup, invariants)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status the API layer answers with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Repository(e) => e.kind.status_code(),
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => 500,
        }
    }

    /// Repository error kind, when this wraps one
    pub fn repository_kind(&self) -> Option<RepositoryErrorKind> {
        match self {
            Error::Repository(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
