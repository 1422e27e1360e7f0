//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::models::FetchHandle;
use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The backend could not be reached.
    #[display("archive backend unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// No fetch attempt was ever opened with this handle.
    #[display("unknown fetch attempt: {_0}")]
    UnknownFetchAttempt(#[error(not(source))] FetchHandle),
    /// Fetch attempts are closed exactly once.
    #[display("fetch attempt already closed: {_0}")]
    FetchAttemptClosed(#[error(not(source))] FetchHandle),
    /// A value could not be converted to or from its stored representation.
    #[display("invalid archive data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Underlying database error.
    #[display("database error")]
    Database,
    /// Database migrations could not be applied.
    #[display("database migration error")]
    Migration,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Database)
    }
}
