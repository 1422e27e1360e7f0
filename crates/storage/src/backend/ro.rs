//! Read-only archive backend.
//!
//! This module provides a backend that wraps other implementations and
//! prevents write operations from executing, while indicating success on
//! return. It powers dry runs: the pipeline still asks the real archive which
//! contents are missing, but nothing is ever written.

use crate::error::Result;
use crate::models::{
    Content, DirectoryRecord, FetchHandle, FetchOutcome, ObjectId, Occurrence, OriginId, Release, Revision,
};
use crate::{ArchiveBackend, BackendHandle};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read-only archive backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event). Fetch attempts are not recorded in the
/// wrapped backend; handles are handed out locally instead.
pub struct ReadOnlyBackend {
    inner: BackendHandle,
    next_handle: AtomicU64,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner, next_handle: AtomicU64::new(1) }
    }
}

#[async_trait]
impl ArchiveBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn query_missing_content(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        self.inner.query_missing_content(ids).await
    }

    async fn submit_content(&self, contents: &[Content]) -> Result<()> {
        tracing::info!(backend = self.name(), count = contents.len(), "Read-only mode; skipping content submission");
        Ok(())
    }

    async fn submit_directories(&self, directories: &[DirectoryRecord]) -> Result<()> {
        tracing::info!(backend = self.name(), count = directories.len(), "Read-only mode; skipping directory submission");
        Ok(())
    }

    async fn submit_revisions(&self, revisions: &[Revision]) -> Result<()> {
        tracing::info!(backend = self.name(), count = revisions.len(), "Read-only mode; skipping revision submission");
        Ok(())
    }

    async fn submit_releases(&self, releases: &[Release]) -> Result<()> {
        tracing::info!(backend = self.name(), count = releases.len(), "Read-only mode; skipping release submission");
        Ok(())
    }

    async fn submit_occurrences(&self, occurrences: &[Occurrence]) -> Result<()> {
        tracing::info!(backend = self.name(), count = occurrences.len(), "Read-only mode; skipping occurrence submission");
        Ok(())
    }

    async fn open_fetch_attempt(&self, origin: OriginId) -> Result<FetchHandle> {
        let handle = FetchHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        tracing::info!(backend = self.name(), origin, %handle, "Read-only mode; fetch attempt not recorded");
        Ok(handle)
    }

    async fn close_fetch_attempt(&self, handle: FetchHandle, outcome: FetchOutcome) -> Result<()> {
        tracing::info!(backend = self.name(), %handle, status = ?outcome.status(), "Read-only mode; fetch attempt not recorded");
        Ok(())
    }
}
