use crate::changelog::Changelog;
use crate::control::ControlFile;
use crate::error::{ErrorKind, Result};
use crate::file::{FileInfo, file_info};
use crate::signature::{SignatureVerifier, signature_info};
use debarchive_storage::models::Person;
use exn::ResultExt;
use std::path::Path;
use time::OffsetDateTime;

/// Provenance of one source package, built once and never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// `(package, version)` pairs, oldest first.
    pub history: Vec<(String, String)>,
    /// Author of the latest changelog entry.
    pub author: Person,
    /// Date of the latest changelog entry, in the offset it was written with.
    pub author_date: OffsetDateTime,
    /// Signer of the control file; unknown if the signature could not be
    /// checked.
    pub committer: Person,
    /// Signature creation time, UTC.
    pub committer_date: OffsetDateTime,
    pub signing_key: String,
    /// The control file itself, then every file it lists.
    pub source_files: Vec<FileInfo>,
}

/// Collect the metadata of a package extracted to `extracted`.
///
/// Source files listed by the control file are looked up next to it.
#[tracing::instrument(level = "debug", skip_all, fields(control = %control.display()))]
pub fn package_metadata(
    control: &Path,
    extracted: &Path,
    verifier: &dyn SignatureVerifier,
) -> Result<PackageMetadata> {
    let changelog = Changelog::read(&extracted.join("debian").join("changelog"))?;
    let latest = changelog.latest()?;

    let parsed = ControlFile::read(control)?;
    let mut source_files = vec![file_info(control)?];
    let directory = control.parent().unwrap_or_else(|| Path::new(""));
    for entry in parsed.files()? {
        source_files.push(file_info(&directory.join(&entry.name))?);
    }

    let message = std::fs::read(control).or_raise(|| ErrorKind::Io(control.to_path_buf()))?;
    let signature = signature_info(&verifier.verify(&message)?)?;
    tracing::debug!(
        history = changelog.entries().len(),
        files = source_files.len(),
        key = %signature.key_id,
        "Collected package metadata"
    );

    Ok(PackageMetadata {
        history: changelog.history(),
        author: latest.author.clone(),
        author_date: latest.date,
        committer: signature.signer,
        committer_date: signature.date,
        signing_key: signature.key_id,
        source_files,
    })
}
