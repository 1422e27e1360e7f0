use crate::accumulator::ObjectAccumulator;
use crate::error::{ErrorKind, Result};
use crate::process::PartialResult;
use debarchive_config::FlushThresholds;
use debarchive_storage::ArchiveBackend;
use debarchive_storage::models::{Content, ObjectId};
use debarchive_tree::read_content;
use exn::ResultExt;
use std::collections::HashSet;

/// Reason recorded for contents archived without their body.
pub const CONTENT_TOO_LARGE: &str = "Content too large";

/// What a call to [`maybe_flush`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: bool,
    /// Contents the backend was missing, bodies included.
    pub contents_submitted: usize,
    /// Contents the backend already held.
    pub contents_skipped: usize,
    /// Missing contents submitted without a body, for being too large.
    pub contents_absent: usize,
    pub directories_submitted: usize,
    pub temp_dirs_removed: usize,
}

/// Whether any threshold is reached.
pub fn should_flush(accumulator: &ObjectAccumulator, thresholds: &FlushThresholds) -> bool {
    accumulator.content_count() >= thresholds.content_packet_size
        || accumulator.directory_count() >= thresholds.directory_packet_size
        || accumulator.eligible_length(thresholds.content_max_length_one) >= thresholds.content_packet_length
}

/// Write everything accumulated so far to `backend` if a threshold is
/// reached, or unconditionally if `force` is set.
///
/// Only contents the backend reports as missing are read and submitted;
/// directories are always submitted. Once both are stored, the temporary
/// directories of the flushed packages are removed. The pending objects are
/// cleared but their ids stay seen.
#[tracing::instrument(level = "debug", skip_all, fields(backend = backend.name(), force))]
pub async fn maybe_flush(
    backend: &dyn ArchiveBackend,
    partial: &mut PartialResult,
    thresholds: &FlushThresholds,
    force: bool,
) -> Result<FlushReport> {
    if !force && !should_flush(&partial.accumulator, thresholds) {
        return Ok(FlushReport::default());
    }
    let mut report = FlushReport { flushed: true, ..FlushReport::default() };

    let pending = partial.accumulator.take_contents();
    if !pending.is_empty() {
        let ids: Vec<ObjectId> = pending.keys().cloned().collect();
        let missing: HashSet<ObjectId> =
            backend.query_missing_content(&ids).await.or_raise(|| ErrorKind::Storage)?.into_iter().collect();
        // Ids the backend reports but were never asked about are ignored.
        let records: Vec<_> = pending.values().filter(|record| missing.contains(&record.id)).collect();
        report.contents_skipped = pending.len() - records.len();

        let mut contents = Vec::with_capacity(records.len());
        for record in records {
            if record.length > thresholds.content_max_length_one {
                tracing::debug!(id = %record.id, length = record.length, "Content too large; archiving as absent");
                report.contents_absent += 1;
                contents.push(Content::absent(record, CONTENT_TOO_LARGE));
            } else {
                let data = read_content(record).or_raise(|| ErrorKind::Io(record.path.clone()))?;
                contents.push(Content::visible(record, data));
            }
        }
        if !contents.is_empty() {
            backend.submit_content(&contents).await.or_raise(|| ErrorKind::Storage)?;
        }
        report.contents_submitted = contents.len();
    }

    let directories = partial.accumulator.take_directories();
    if !directories.is_empty() {
        backend.submit_directories(&directories).await.or_raise(|| ErrorKind::Storage)?;
    }
    report.directories_submitted = directories.len();

    for dir in partial.temp_dirs.drain(..) {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => report.temp_dirs_removed += 1,
            Err(err) => tracing::warn!(path = %dir.display(), error = %err, "Could not remove temporary directory"),
        }
    }

    tracing::info!(
        backend = backend.name(),
        contents = report.contents_submitted,
        skipped = report.contents_skipped,
        absent = report.contents_absent,
        directories = report.directories_submitted,
        "Flushed accumulated objects"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{content, directory, file_content};
    use async_trait::async_trait;
    use debarchive_storage::backend::{MockBackend, Operation};
    use debarchive_storage::error::Result as StorageResult;
    use debarchive_storage::models::{
        ContentStatus, DirectoryRecord, FetchHandle, FetchOutcome, ObjectSet, Occurrence, OriginId, Release, Revision,
    };
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn thresholds(content_packet_size: usize) -> FlushThresholds {
        FlushThresholds {
            content_packet_size,
            content_packet_length: 1000,
            content_max_length_one: 100,
            directory_packet_size: 10,
        }
    }

    fn partial_with(contents: Vec<debarchive_storage::models::ContentRecord>) -> PartialResult {
        let mut partial = PartialResult::default();
        let root = directory(0).id;
        partial.accumulator.merge_dedup(ObjectSet { root, contents, directories: vec![directory(0)] });
        partial
    }

    #[rstest]
    #[case(4, false)]
    #[case(5, true)]
    fn test_content_count_threshold(#[case] count: u8, #[case] expected: bool) {
        let contents = (0..count).map(|b| content(b, 1)).collect();
        let partial = partial_with(contents);
        assert_eq!(should_flush(&partial.accumulator, &thresholds(5)), expected);
    }

    #[test]
    fn test_oversized_contents_do_not_count_toward_length() {
        let partial = partial_with(vec![content(1, 100_000), content(2, 100)]);
        assert!(!should_flush(&partial.accumulator, &thresholds(50)));
        let partial = partial_with((0..10).map(|b| content(b, 100)).collect());
        assert!(should_flush(&partial.accumulator, &thresholds(50)));
    }

    #[test]
    fn test_directory_threshold() {
        let mut partial = PartialResult::default();
        let directories: Vec<_> = (0..10).map(directory).collect();
        let root = directories[9].id.clone();
        partial.accumulator.merge_dedup(ObjectSet { root, contents: Vec::new(), directories });
        assert!(should_flush(&partial.accumulator, &thresholds(50)));
    }

    #[tokio::test]
    async fn test_below_thresholds_does_nothing() {
        let backend = MockBackend::default();
        let mut partial = partial_with(vec![content(1, 1)]);
        let report = maybe_flush(&backend, &mut partial, &thresholds(5), false).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(partial.accumulator.content_count(), 1);
        assert!(backend.content_batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_forced_flush() {
        let source = TempDir::new().unwrap();
        let small = file_content(source.path(), "small", b"hello\n");
        let large = file_content(source.path(), "large", &[0u8; 200]);
        let temp_dir = TempDir::new().unwrap().keep();
        fs::write(temp_dir.join("leftover"), b"x").unwrap();

        let backend = MockBackend::default();
        let mut partial = partial_with(vec![small.clone(), large.clone()]);
        partial.temp_dirs.push(temp_dir.clone());
        let report = maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap();

        assert!(report.flushed);
        assert_eq!(report.contents_submitted, 2);
        assert_eq!(report.contents_absent, 1);
        assert_eq!(report.directories_submitted, 1);
        assert_eq!(report.temp_dirs_removed, 1);
        assert!(!temp_dir.exists());
        assert!(partial.temp_dirs.is_empty());
        assert!(partial.accumulator.is_empty());
        assert!(partial.accumulator.content_seen(&small.id));

        let stored = backend.contents().await;
        assert_eq!(stored[&small.id].data.as_deref(), Some(&b"hello\n"[..]));
        assert_eq!(stored[&large.id].status, ContentStatus::Absent);
        assert_eq!(stored[&large.id].reason.as_deref(), Some(CONTENT_TOO_LARGE));
        assert_eq!(stored[&large.id].data, None);
    }

    #[tokio::test]
    async fn test_archived_contents_are_skipped() {
        let source = TempDir::new().unwrap();
        let old = file_content(source.path(), "old", b"old");
        let new = file_content(source.path(), "new", b"new");
        let backend = MockBackend::with_contents([Content::visible(&old, b"old".to_vec())]);
        let mut partial = partial_with(vec![old.clone(), new.clone()]);

        let report = maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap();
        assert_eq!(report.contents_skipped, 1);
        assert_eq!(report.contents_submitted, 1);
        assert_eq!(backend.content_batches().await, vec![vec![new.id]]);
        // Directories go out regardless.
        assert_eq!(backend.directory_batches().await, vec![vec![directory(0).id]]);
    }

    #[tokio::test]
    async fn test_seen_ids_are_not_flushed_again() {
        let source = TempDir::new().unwrap();
        let shared = file_content(source.path(), "shared", b"shared");
        let backend = MockBackend::default();
        let mut partial = partial_with(vec![shared.clone()]);
        maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap();

        partial.accumulator.merge_dedup(ObjectSet {
            root: directory(0).id,
            contents: vec![shared],
            directories: vec![directory(0)],
        });
        let report = maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap();
        assert_eq!(report.contents_submitted, 0);
        assert_eq!(report.directories_submitted, 0);
        assert_eq!(backend.content_batches().await.len(), 1);
        assert_eq!(backend.directory_batches().await.len(), 1);
    }

    /// Reports one id it was never asked about, twice.
    struct Overreporting(MockBackend);

    #[async_trait]
    impl ArchiveBackend for Overreporting {
        fn name(&self) -> &str {
            "overreporting"
        }
        async fn query_missing_content(&self, ids: &[ObjectId]) -> StorageResult<Vec<ObjectId>> {
            let mut missing = self.0.query_missing_content(ids).await?;
            missing.extend([content(200, 1).id, content(200, 1).id]);
            Ok(missing)
        }
        async fn submit_content(&self, contents: &[Content]) -> StorageResult<()> {
            self.0.submit_content(contents).await
        }
        async fn submit_directories(&self, directories: &[DirectoryRecord]) -> StorageResult<()> {
            self.0.submit_directories(directories).await
        }
        async fn submit_revisions(&self, revisions: &[Revision]) -> StorageResult<()> {
            self.0.submit_revisions(revisions).await
        }
        async fn submit_releases(&self, releases: &[Release]) -> StorageResult<()> {
            self.0.submit_releases(releases).await
        }
        async fn submit_occurrences(&self, occurrences: &[Occurrence]) -> StorageResult<()> {
            self.0.submit_occurrences(occurrences).await
        }
        async fn open_fetch_attempt(&self, origin: OriginId) -> StorageResult<FetchHandle> {
            self.0.open_fetch_attempt(origin).await
        }
        async fn close_fetch_attempt(&self, handle: FetchHandle, outcome: FetchOutcome) -> StorageResult<()> {
            self.0.close_fetch_attempt(handle, outcome).await
        }
    }

    #[tokio::test]
    async fn test_unrequested_missing_ids_are_ignored() {
        let source = TempDir::new().unwrap();
        let known = file_content(source.path(), "known", b"known");
        let backend = Overreporting(MockBackend::with_contents([Content::visible(&known, b"known".to_vec())]));
        let mut partial = partial_with(vec![known.clone()]);

        let report = maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap();
        assert_eq!(report.contents_skipped, 1);
        assert_eq!(report.contents_submitted, 0);
        assert!(backend.0.content_batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let backend = MockBackend::default().failing_on(Operation::QueryMissingContent);
        let mut partial = partial_with(vec![content(1, 1)]);
        let err = maybe_flush(&backend, &mut partial, &thresholds(5), true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
        assert!(err.is_retryable());
    }
}
