//! Provenance extraction for Debian source packages.
//!
//! Everything the archive records about a package besides its file tree:
//! the changelog history and latest author, the control file's list of
//! source files with their hashes, and who signed the upload.

mod changelog;
mod consts;
mod control;
mod encoding;
pub mod error;
mod file;
mod package;
mod signature;

pub use crate::changelog::{Changelog, ChangelogEntry};
pub use crate::control::{ControlFile, ControlFileEntry};
pub use crate::encoding::decode_latin9;
pub use crate::file::{FileInfo, file_info};
pub use crate::package::{PackageMetadata, package_metadata};
pub use crate::signature::{GpgStatus, KeyringVerifier, SignatureInfo, SignatureVerifier, signature_info};
