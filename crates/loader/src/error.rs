//! Loader Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the metadata, tree and
//! storage crates are kept as children of these.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A loader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A package's control file does not exist.
    #[display("control file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// No `dpkg-source` on `PATH` and none configured.
    #[display("unpacker not found")]
    UnpackerNotFound,
    /// The unpacker could not be started at all.
    #[display("could not run unpacker {}", _0.display())]
    Unpacker(#[error(not(source))] PathBuf),
    /// The unpacker ran and failed; its output is in `log`.
    #[display("extraction failed (exit code {code:?}), see {}", log.display())]
    ExtractionFailure { code: Option<i32>, log: PathBuf },
    /// The extracted tree could not be hashed.
    #[display("could not hash extracted tree")]
    Hashing,
    /// Changelog, control file or source files are unusable.
    #[display("could not collect package metadata")]
    Metadata,
    /// The control file is not signed.
    #[display("package is not signed")]
    MissingSignature,
    /// The archive backend failed.
    #[display("archive backend failure")]
    Storage,
    /// Local filesystem failure on temporary files.
    #[display("I/O error on {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Occurrences cannot be recorded without an authority.
    #[display("no authority configured")]
    MissingAuthority,
    /// Sessions are single-use.
    #[display("ingestion session already ran")]
    SessionReused,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Io(_))
    }
}
