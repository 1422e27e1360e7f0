//! Archive backend trait and implementations.
//!
//! This module defines the `ArchiveBackend` trait, the contract the ingestion
//! pipeline consumes: a missing-content query, bulk submission of every
//! object kind, and the fetch-attempt log.

#[cfg(feature = "mock")]
mod mock;
mod ro;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteBackend;
use crate::error::Result;
use crate::models::{
    Content, DirectoryRecord, FetchHandle, FetchOutcome, ObjectId, Occurrence, OriginId, Release, Revision,
};
use async_trait::async_trait;

/// Unified interface for archive backends.
///
/// All operations are asynchronous because the interesting backends sit on
/// the other side of a network. Object ids are content-derived, so every
/// `submit_*` method is idempotent: submitting an id the backend already
/// holds must not overwrite it and must not fail.
///
/// # Examples
///
/// ```
/// use debarchive_storage::{ArchiveBackend, error::Result, models::{Content, ObjectId}};
///
/// async fn archive_if_missing(backend: &dyn ArchiveBackend, content: Content) -> Result<bool> {
///     let missing = backend.query_missing_content(&[content.id.clone()]).await?;
///     if missing.is_empty() {
///         return Ok(false);
///     }
///     backend.submit_content(&[content]).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Return the subset of `ids` the backend does not durably hold yet.
    ///
    /// The order of the returned ids follows the order of `ids`.
    async fn query_missing_content(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>>;

    /// Store full contents.
    async fn submit_content(&self, contents: &[Content]) -> Result<()>;

    /// Store directory listings.
    async fn submit_directories(&self, directories: &[DirectoryRecord]) -> Result<()>;

    async fn submit_revisions(&self, revisions: &[Revision]) -> Result<()>;

    async fn submit_releases(&self, releases: &[Release]) -> Result<()>;

    async fn submit_occurrences(&self, occurrences: &[Occurrence]) -> Result<()>;

    /// Record the start of an ingestion attempt against an origin.
    async fn open_fetch_attempt(&self, origin: OriginId) -> Result<FetchHandle>;

    /// Record how an ingestion attempt ended.
    ///
    /// Returns [`FetchAttemptClosed`](crate::error::ErrorKind::FetchAttemptClosed)
    /// if the attempt was already closed.
    async fn close_fetch_attempt(&self, handle: FetchHandle, outcome: FetchOutcome) -> Result<()>;
}
