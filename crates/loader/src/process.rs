use crate::accumulator::{ObjectAccumulator, dedup_within};
use crate::error::{ErrorKind, Result};
use debarchive_metadata::error::ErrorKind as MetadataErrorKind;
use debarchive_metadata::{PackageMetadata, SignatureVerifier, package_metadata};
use debarchive_storage::models::{ObjectId, ObjectSet, OriginId};
use debarchive_tree::TreeHasher;
use exn::ResultExt;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::instrument;

const DPKG_SOURCE: &str = "dpkg-source";
const DPKG_SOURCE_ARGS: [&str; 4] = ["--no-copy", "--no-check", "--ignore-bad-version", "-x"];

/// A source package to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    /// Path to the `.dsc`; the files it lists must sit next to it.
    pub control: PathBuf,
    pub origin: OriginId,
}

/// A package after extraction, hashing and metadata collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPackage {
    pub descriptor: PackageDescriptor,
    pub metadata: PackageMetadata,
    /// Temporary directory the package was extracted under.
    pub temp_dir: PathBuf,
    /// Id of the root directory of the extracted tree.
    pub directory: ObjectId,
}

/// Runs the external tool that unpacks a source package.
///
/// The tool is invoked as `<program> <args...> <control file> <target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacker {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Unpacker {
    /// `dpkg-source` found on `PATH`.
    pub fn discover() -> Result<Self> {
        match which::which(DPKG_SOURCE) {
            Ok(program) => Ok(Self::dpkg_source(program)),
            Err(err) => {
                tracing::info!(error = %err, "dpkg-source not found in PATH");
                exn::bail!(ErrorKind::UnpackerNotFound)
            },
        }
    }

    /// `dpkg-source` at an explicit location.
    pub fn dpkg_source(program: impl Into<PathBuf>) -> Self {
        Self::with_args(program, DPKG_SOURCE_ARGS)
    }

    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Unpack `control` so that `destination` becomes the root of the
    /// package tree.
    ///
    /// The tool writes to `<destination>.tmp`, which is renamed into place
    /// only once it succeeded. Everything it prints goes to
    /// `<destination>.log`, which is kept either way.
    #[instrument(level = "debug", skip_all, fields(control = %control.display(), destination = %destination.display()))]
    pub async fn extract(&self, control: &Path, destination: &Path) -> Result<()> {
        let staging = with_suffix(destination, ".tmp");
        let log = with_suffix(destination, ".log");
        let stdout = File::create(&log).or_raise(|| ErrorKind::Io(log.clone()))?;
        let stderr = stdout.try_clone().or_raise(|| ErrorKind::Io(log.clone()))?;
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(control)
            .arg(&staging)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .await
            .or_raise(|| ErrorKind::Unpacker(self.program.clone()))?;
        if !status.success() {
            if tokio::fs::try_exists(&staging).await.unwrap_or(false)
                && let Err(err) = tokio::fs::remove_dir_all(&staging).await
            {
                tracing::warn!(path = %staging.display(), error = %err, "Could not remove staging directory");
            }
            exn::bail!(ErrorKind::ExtractionFailure { code: status.code(), log });
        }
        tokio::fs::rename(&staging, destination).await.or_raise(|| ErrorKind::Io(destination.to_path_buf()))
    }
}

fn with_suffix(path: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut path = path.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

/// Turns package descriptors into processed packages and object sets.
pub struct PackageProcessor {
    unpacker: Unpacker,
    hasher: Arc<dyn TreeHasher>,
    verifier: Arc<dyn SignatureVerifier>,
    temp_root: PathBuf,
}

impl PackageProcessor {
    /// Per-package temporary directories are created below `temp_root`.
    pub fn new(
        unpacker: Unpacker,
        hasher: Arc<dyn TreeHasher>,
        verifier: Arc<dyn SignatureVerifier>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self { unpacker, hasher, verifier, temp_root: temp_root.into() }
    }

    /// Extract, hash and describe one package.
    ///
    /// The returned object set is deduplicated within the package. The
    /// temporary directory is left in place for the caller to remove once
    /// the objects have been flushed.
    #[instrument(skip_all, fields(package = %package.name, version = %package.version))]
    pub async fn process(&self, package: &PackageDescriptor) -> Result<(ProcessedPackage, ObjectSet)> {
        if !tokio::fs::try_exists(&package.control).await.unwrap_or(false) {
            exn::bail!(ErrorKind::NotFound(package.control.clone()));
        }
        let temp_dir = tempfile::Builder::new()
            .prefix("package-")
            .tempdir_in(&self.temp_root)
            .or_raise(|| ErrorKind::Io(self.temp_root.clone()))?
            .keep();
        let extracted = temp_dir.join(format!("{}_{}", package.name, package.version));
        self.unpacker.extract(&package.control, &extracted).await?;

        let objects = self.hasher.compute_tree(&extracted).or_raise(|| ErrorKind::Hashing)?;
        let objects = dedup_within(objects);

        let metadata = package_metadata(&package.control, &extracted, self.verifier.as_ref());
        let unsigned = matches!(&metadata, Err(err) if matches!(&**err, MetadataErrorKind::MissingSignature));
        let metadata =
            metadata.or_raise(|| if unsigned { ErrorKind::MissingSignature } else { ErrorKind::Metadata })?;

        tracing::debug!(
            contents = objects.contents.len(),
            directories = objects.directories.len(),
            root = %objects.root,
            "Processed package"
        );
        let processed = ProcessedPackage {
            descriptor: package.clone(),
            metadata,
            temp_dir,
            directory: objects.root.clone(),
        };
        Ok((processed, objects))
    }

    /// Process `packages` one at a time, in the order given.
    pub fn process_all(&self, packages: Vec<PackageDescriptor>) -> ProcessAll<'_> {
        ProcessAll { processor: self, pending: packages.into_iter(), partial: PartialResult::default() }
    }
}

/// Progress of a run so far.
#[derive(Debug, Default)]
pub struct PartialResult {
    pub accumulator: ObjectAccumulator,
    /// Every package processed in this run, in processing order.
    pub packages: Vec<ProcessedPackage>,
    /// Temporary directories of the packages processed since the last
    /// flush.
    pub temp_dirs: Vec<PathBuf>,
}

/// Lending cursor over a run.
///
/// Each step processes one package and hands out the shared
/// [`PartialResult`]; whatever the caller does to it (flushing, typically)
/// is visible to the following steps.
pub struct ProcessAll<'a> {
    processor: &'a PackageProcessor,
    pending: std::vec::IntoIter<PackageDescriptor>,
    partial: PartialResult,
}

impl ProcessAll<'_> {
    /// Process the next package, or return `None` once all are done.
    ///
    /// After an error the cursor may still be advanced, but the run is
    /// usually abandoned instead.
    pub async fn advance(&mut self) -> Option<Result<&mut PartialResult>> {
        let package = self.pending.next()?;
        match self.processor.process(&package).await {
            Ok((processed, objects)) => {
                self.partial.accumulator.merge_dedup(objects);
                self.partial.temp_dirs.push(processed.temp_dir.clone());
                self.partial.packages.push(processed);
                Some(Ok(&mut self.partial))
            },
            Err(err) => Some(Err(err)),
        }
    }

    pub fn partial(&mut self) -> &mut PartialResult {
        &mut self.partial
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn into_partial(self) -> PartialResult {
        self.partial
    }
}
