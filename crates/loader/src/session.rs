use crate::converters::{occurrence, package_to_revision, revision_to_release};
use crate::error::{Error, ErrorKind, Result};
use crate::flush::maybe_flush;
use crate::process::{PackageDescriptor, PackageProcessor, Unpacker};
use debarchive_config::{Config, FlushThresholds};
use debarchive_metadata::{KeyringVerifier, SignatureVerifier};
use debarchive_storage::BackendHandle;
use debarchive_storage::backend::ReadOnlyBackend;
use debarchive_storage::models::{Authority, FetchHandle, FetchOutcome, OriginId};
use debarchive_tree::{GitTreeHasher, TreeHasher};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    ClosingSuccess,
    ClosingFailure,
    Terminal,
}

/// Counts of what a successful run recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub packages: usize,
    pub revisions: usize,
    pub releases: usize,
    pub occurrences: usize,
    pub origins: usize,
    /// Flushes performed, the final forced one included.
    pub flushes: usize,
}

/// One ingestion run over a list of packages.
///
/// The session opens a fetch attempt for every origin before touching any
/// package and closes each of them exactly once: with success if the whole
/// run went through, with the error otherwise. Objects flushed before a
/// failure stay archived. Every temporary file of the run lives under a
/// single directory that is removed when the run ends, however it ends.
///
/// Sessions are single-use.
pub struct IngestionSession {
    backend: BackendHandle,
    unpacker: Unpacker,
    verifier: Arc<dyn SignatureVerifier>,
    hasher: Arc<dyn TreeHasher>,
    authority: Authority,
    thresholds: FlushThresholds,
    temp_dir: Option<PathBuf>,
    state: SessionState,
}

impl IngestionSession {
    pub fn new(
        backend: BackendHandle,
        unpacker: Unpacker,
        verifier: Arc<dyn SignatureVerifier>,
        authority: Authority,
    ) -> Self {
        Self {
            backend,
            unpacker,
            verifier,
            hasher: Arc::new(GitTreeHasher),
            authority,
            thresholds: FlushThresholds::default(),
            temp_dir: None,
            state: SessionState::Idle,
        }
    }

    /// Build a session from configuration.
    ///
    /// Occurrences recorded by the run are valid from `validity`. With
    /// `dry_run` set, `backend` is only queried; writes are dropped.
    pub fn from_config(backend: BackendHandle, config: &Config, validity: OffsetDateTime) -> Result<Self> {
        let authority = config.authority.clone().ok_or_raise(|| ErrorKind::MissingAuthority)?;
        let backend: BackendHandle = if config.dry_run {
            tracing::info!(backend = backend.name(), "Dry run; nothing will be written to the archive");
            Arc::new(ReadOnlyBackend::new(backend))
        } else {
            backend
        };
        let unpacker = match &config.unpacker {
            Some(program) => Unpacker::dpkg_source(program),
            None => Unpacker::discover()?,
        };
        let verifier = KeyringVerifier::from_keyrings(config.keyring_files().as_slice());
        if verifier.is_empty() {
            tracing::warn!("No OpenPGP certificates loaded; every package will fail signature checks");
        }
        let mut session = Self::new(backend, unpacker, Arc::new(verifier), Authority { id: authority, validity })
            .with_thresholds(config.flush);
        if let Some(temp_dir) = &config.temp_dir {
            session = session.with_temp_dir(temp_dir);
        }
        Ok(session)
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn TreeHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_thresholds(mut self, thresholds: FlushThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Create the run's temporary directory under `path` instead of the
    /// system default.
    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Ingest `packages`, in `(name, version)` order.
    #[tracing::instrument(skip_all, fields(backend = self.backend.name(), packages = packages.len()))]
    pub async fn run(&mut self, packages: Vec<PackageDescriptor>) -> Result<RunOutcome> {
        if self.state != SessionState::Idle {
            exn::bail!(ErrorKind::SessionReused);
        }
        self.state = SessionState::Running;

        let mut origins: Vec<OriginId> = packages.iter().map(|p| p.origin).collect();
        origins.sort_unstable();
        origins.dedup();
        let mut attempts = Vec::with_capacity(origins.len());
        for &origin in &origins {
            match self.backend.open_fetch_attempt(origin).await.or_raise(|| ErrorKind::Storage) {
                Ok(handle) => attempts.push(handle),
                Err(err) => return Err(self.fail(&attempts, err).await),
            }
        }

        let temp_root = match self.temp_root() {
            Ok(temp_root) => temp_root,
            Err(err) => return Err(self.fail(&attempts, err).await),
        };
        let result = self.execute(packages, temp_root.path()).await;
        let result = match result {
            Ok(mut outcome) => {
                outcome.origins = origins.len();
                self.succeed(&attempts).await.map(|()| outcome)
            },
            Err(err) => Err(self.fail(&attempts, err).await),
        };
        let path = temp_root.path().to_path_buf();
        if let Err(err) = temp_root.close() {
            tracing::warn!(path = %path.display(), error = %err, "Could not remove temporary directory");
        }
        self.state = SessionState::Terminal;

        if let Ok(outcome) = &result {
            tracing::info!(
                packages = outcome.packages,
                revisions = outcome.revisions,
                origins = outcome.origins,
                flushes = outcome.flushes,
                "Ingestion run complete"
            );
        }
        result
    }

    fn temp_root(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("debarchive-");
        match &self.temp_dir {
            Some(parent) => builder.tempdir_in(parent).or_raise(|| ErrorKind::Io(parent.clone())),
            None => builder.tempdir().or_raise(|| ErrorKind::Io(std::env::temp_dir())),
        }
    }

    async fn execute(&self, mut packages: Vec<PackageDescriptor>, temp_root: &Path) -> Result<RunOutcome> {
        packages.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        let backend = self.backend.as_ref();
        let processor =
            PackageProcessor::new(self.unpacker.clone(), self.hasher.clone(), self.verifier.clone(), temp_root);
        let mut outcome = RunOutcome::default();

        let mut cursor = processor.process_all(packages);
        while let Some(step) = cursor.advance().await {
            let partial = step?;
            if maybe_flush(backend, partial, &self.thresholds, false).await?.flushed {
                outcome.flushes += 1;
            }
        }
        let mut partial = cursor.into_partial();
        maybe_flush(backend, &mut partial, &self.thresholds, true).await?;
        outcome.flushes += 1;

        let revisions: Vec<_> = partial.packages.iter().map(package_to_revision).collect();
        let releases: Vec<_> = revisions.iter().map(revision_to_release).collect();
        let occurrences: Vec<_> = partial
            .packages
            .iter()
            .zip(&revisions)
            .map(|(package, revision)| occurrence(package, &revision.id, &self.authority))
            .collect();
        if !revisions.is_empty() {
            backend.submit_revisions(&revisions).await.or_raise(|| ErrorKind::Storage)?;
            backend.submit_releases(&releases).await.or_raise(|| ErrorKind::Storage)?;
            backend.submit_occurrences(&occurrences).await.or_raise(|| ErrorKind::Storage)?;
        }

        outcome.packages = partial.packages.len();
        outcome.revisions = revisions.len();
        outcome.releases = releases.len();
        outcome.occurrences = occurrences.len();
        Ok(outcome)
    }

    /// Close every attempt with success. If one cannot be closed, the rest
    /// are closed with that failure instead.
    async fn succeed(&mut self, attempts: &[FetchHandle]) -> Result<()> {
        self.state = SessionState::ClosingSuccess;
        for (index, &handle) in attempts.iter().enumerate() {
            let closed =
                self.backend.close_fetch_attempt(handle, FetchOutcome::Success).await.or_raise(|| ErrorKind::Storage);
            if let Err(err) = closed {
                return Err(self.fail(&attempts[index + 1..], err).await);
            }
        }
        Ok(())
    }

    /// Close `attempts` with `err` and hand the error back.
    async fn fail(&mut self, attempts: &[FetchHandle], err: Error) -> Error {
        self.state = SessionState::ClosingFailure;
        tracing::warn!(error = %err, attempts = attempts.len(), "Ingestion run failed");
        let detail = format!("{err:?}");
        for &handle in attempts {
            let outcome = FetchOutcome::Failure { detail: detail.clone() };
            if let Err(close_err) = self.backend.close_fetch_attempt(handle, outcome).await {
                tracing::warn!(attempt = %handle, error = %close_err, "Could not close fetch attempt");
            }
        }
        err
    }
}
