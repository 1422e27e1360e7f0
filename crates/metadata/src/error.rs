//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A file the package refers to does not exist.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// A file exists but could not be read.
    #[display("could not read {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Text is neither UTF-8 nor ISO-8859-15.
    #[display("unsupported text encoding in {}", _0.display())]
    Encoding(#[error(not(source))] PathBuf),
    /// The changelog has no parseable entry, or a malformed one.
    #[display("malformed changelog: {_0}")]
    Changelog(#[error(not(source))] String),
    /// The control file is not a valid deb822 paragraph.
    #[display("malformed control file: {_0}")]
    ControlFile(#[error(not(source))] String),
    /// Neither a valid nor a failed signature was found.
    #[display("control file carries no signature")]
    MissingSignature,
    /// The signature could not be processed at all.
    #[display("signature verification error: {_0}")]
    Verification(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
