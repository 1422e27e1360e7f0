//! Tree Hashing Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A tree hashing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for tree hashing operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The root handed to the hasher is not a directory.
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// A file inside the tree could not be read.
    #[display("could not read {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
