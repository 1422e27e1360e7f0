//! In-memory archive backend for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{
    Content, DirectoryRecord, FetchAttempt, FetchHandle, FetchOutcome, ObjectId, Occurrence, OriginId, Release,
    Revision,
};
use crate::ArchiveBackend;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// Backend operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    QueryMissingContent,
    SubmitContent,
    SubmitDirectories,
    SubmitRevisions,
    SubmitReleases,
    SubmitOccurrences,
    OpenFetchAttempt,
    CloseFetchAttempt,
}

#[derive(Default)]
struct State {
    contents: BTreeMap<ObjectId, Content>,
    directories: BTreeMap<ObjectId, DirectoryRecord>,
    revisions: BTreeMap<ObjectId, Revision>,
    releases: BTreeMap<ObjectId, Release>,
    occurrences: Vec<Occurrence>,
    attempts: Vec<FetchAttempt>,
    /// Every content batch in submission order, to assert on flush behaviour.
    content_batches: Vec<Vec<ObjectId>>,
    directory_batches: Vec<Vec<ObjectId>>,
}

/// In-memory archive backend for testing.
///
/// Objects are stored in maps behind a [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Every submission is
/// also recorded as a batch, and any operation can be switched to fail, so
/// tests can assert on *when* the pipeline talks to storage and how it
/// reacts to an unreachable backend.
///
/// # Examples
///
/// ```
/// use debarchive_storage::backend::{MockBackend, Operation};
/// use debarchive_storage::ArchiveBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::default();
/// let _handle = backend.open_fetch_attempt(1).await?;
/// assert_eq!(backend.attempts().await.len(), 1);
///
/// let failing = MockBackend::default().failing_on(Operation::SubmitContent);
/// assert!(failing.submit_content(&[]).await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    failing: HashSet<Operation>,
    state: RwLock<State>,
}

impl MockBackend {
    /// Create a mock backend that already holds the given contents.
    pub fn with_contents(contents: impl IntoIterator<Item = Content>) -> Self {
        let contents = contents.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            name: "mock".to_string(),
            failing: HashSet::new(),
            state: RwLock::new(State { contents, ..State::default() }),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every call of `operation` fail with
    /// [`Unavailable`](ErrorKind::Unavailable).
    pub fn failing_on(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    fn check(&self, operation: Operation) -> Result<()> {
        if self.failing.contains(&operation) {
            exn::bail!(ErrorKind::Unavailable(format!("{operation:?} disabled on mock backend")));
        }
        Ok(())
    }

    pub async fn contents(&self) -> BTreeMap<ObjectId, Content> {
        self.state.read().await.contents.clone()
    }

    pub async fn directories(&self) -> BTreeMap<ObjectId, DirectoryRecord> {
        self.state.read().await.directories.clone()
    }

    pub async fn revisions(&self) -> Vec<Revision> {
        self.state.read().await.revisions.values().cloned().collect()
    }

    pub async fn releases(&self) -> Vec<Release> {
        self.state.read().await.releases.values().cloned().collect()
    }

    pub async fn occurrences(&self) -> Vec<Occurrence> {
        self.state.read().await.occurrences.clone()
    }

    pub async fn attempts(&self) -> Vec<FetchAttempt> {
        self.state.read().await.attempts.clone()
    }

    /// Ids of every `submit_content` call, in call order.
    pub async fn content_batches(&self) -> Vec<Vec<ObjectId>> {
        self.state.read().await.content_batches.clone()
    }

    /// Ids of every `submit_directories` call, in call order.
    pub async fn directory_batches(&self) -> Vec<Vec<ObjectId>> {
        self.state.read().await.directory_batches.clone()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_contents([])
    }
}

#[async_trait]
impl ArchiveBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_missing_content(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        self.check(Operation::QueryMissingContent)?;
        let guard = self.state.read().await;
        Ok(ids.iter().filter(|id| !guard.contents.contains_key(*id)).cloned().collect())
    }

    async fn submit_content(&self, contents: &[Content]) -> Result<()> {
        self.check(Operation::SubmitContent)?;
        let mut guard = self.state.write().await;
        guard.content_batches.push(contents.iter().map(|c| c.id.clone()).collect());
        for content in contents {
            guard.contents.entry(content.id.clone()).or_insert_with(|| content.clone());
        }
        Ok(())
    }

    async fn submit_directories(&self, directories: &[DirectoryRecord]) -> Result<()> {
        self.check(Operation::SubmitDirectories)?;
        let mut guard = self.state.write().await;
        guard.directory_batches.push(directories.iter().map(|d| d.id.clone()).collect());
        for directory in directories {
            guard.directories.entry(directory.id.clone()).or_insert_with(|| directory.clone());
        }
        Ok(())
    }

    async fn submit_revisions(&self, revisions: &[Revision]) -> Result<()> {
        self.check(Operation::SubmitRevisions)?;
        let mut guard = self.state.write().await;
        for revision in revisions {
            guard.revisions.entry(revision.id.clone()).or_insert_with(|| revision.clone());
        }
        Ok(())
    }

    async fn submit_releases(&self, releases: &[Release]) -> Result<()> {
        self.check(Operation::SubmitReleases)?;
        let mut guard = self.state.write().await;
        for release in releases {
            guard.releases.entry(release.id.clone()).or_insert_with(|| release.clone());
        }
        Ok(())
    }

    async fn submit_occurrences(&self, occurrences: &[Occurrence]) -> Result<()> {
        self.check(Operation::SubmitOccurrences)?;
        self.state.write().await.occurrences.extend_from_slice(occurrences);
        Ok(())
    }

    async fn open_fetch_attempt(&self, origin: OriginId) -> Result<FetchHandle> {
        self.check(Operation::OpenFetchAttempt)?;
        let mut guard = self.state.write().await;
        let handle = FetchHandle(guard.attempts.len() as u64 + 1);
        guard.attempts.push(FetchAttempt::open(handle, origin));
        Ok(handle)
    }

    async fn close_fetch_attempt(&self, handle: FetchHandle, outcome: FetchOutcome) -> Result<()> {
        self.check(Operation::CloseFetchAttempt)?;
        let mut guard = self.state.write().await;
        let Some(attempt) = guard.attempts.iter_mut().find(|a| a.handle == handle) else {
            exn::bail!(ErrorKind::UnknownFetchAttempt(handle));
        };
        if !attempt.is_open() {
            exn::bail!(ErrorKind::FetchAttemptClosed(handle));
        }
        attempt.close(&outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentRecord, FetchStatus};
    use std::path::PathBuf;

    fn content(byte: u8) -> Content {
        let record = ContentRecord {
            id: ObjectId::from_digest([byte; 20]),
            sha1: String::new(),
            sha256: String::new(),
            length: 1,
            path: PathBuf::from("unused"),
        };
        Content::visible(&record, vec![byte])
    }

    #[tokio::test]
    async fn test_query_missing_content() {
        let backend = MockBackend::with_contents([content(1)]);
        let ids = [content(1).id, content(2).id, content(3).id];
        let missing = backend.query_missing_content(&ids).await.unwrap();
        assert_eq!(missing, vec![content(2).id, content(3).id]);
    }

    #[tokio::test]
    async fn test_submit_content_never_overwrites() {
        let backend = MockBackend::with_contents([content(1)]);
        let mut replacement = content(1);
        replacement.data = Some(b"different".to_vec());
        backend.submit_content(&[replacement]).await.unwrap();
        let stored = backend.contents().await;
        assert_eq!(stored[&content(1).id].data.as_deref(), Some(&[1u8][..]));
        assert_eq!(backend.content_batches().await, vec![vec![content(1).id]]);
    }

    #[tokio::test]
    async fn test_fetch_attempt_lifecycle() {
        let backend = MockBackend::default();
        let handle = backend.open_fetch_attempt(7).await.unwrap();
        assert_eq!(backend.attempts().await[0].status, FetchStatus::Pending);
        let outcome = FetchOutcome::Failure { detail: "boom".into() };
        backend.close_fetch_attempt(handle, outcome).await.unwrap();
        let attempt = &backend.attempts().await[0];
        assert_eq!(attempt.origin, 7);
        assert_eq!(attempt.status, FetchStatus::Failure);
        assert_eq!(attempt.detail.as_deref(), Some("boom"));
        assert!(attempt.finished.is_some());
    }

    #[tokio::test]
    async fn test_fetch_attempt_closed_once() {
        let backend = MockBackend::default();
        let handle = backend.open_fetch_attempt(1).await.unwrap();
        backend.close_fetch_attempt(handle, FetchOutcome::Success).await.unwrap();
        let err = backend.close_fetch_attempt(handle, FetchOutcome::Success).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FetchAttemptClosed(_)));
        let err = backend.close_fetch_attempt(FetchHandle(99), FetchOutcome::Success).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownFetchAttempt(_)));
    }

    #[tokio::test]
    async fn test_failing_operation() {
        let backend = MockBackend::default().failing_on(Operation::QueryMissingContent);
        let err = backend.query_missing_content(&[]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        assert!(err.is_retryable());
        // Other operations are unaffected.
        backend.submit_directories(&[]).await.unwrap();
    }
}
