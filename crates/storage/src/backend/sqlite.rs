//! SQLite archive backend.
//!
//! A single-file archive: content bodies are stored inline as blobs, every
//! other object kind as JSON. Good enough for local mirrors and for
//! exercising the full pipeline without a remote archive.

use crate::error::{ErrorKind, Result};
use crate::models::{
    Content, ContentStatus, DirectoryRecord, FetchAttempt, FetchHandle, FetchOutcome, FetchStatus, ObjectId,
    Occurrence, OriginId, Release, Revision,
};
use crate::ArchiveBackend;
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const MAX_CONNECTIONS: u32 = 5;
// SQLite's default limit on bound parameters is 32766; stay well clear.
const QUERY_CHUNK: usize = 500;

/// Archive backend persisting to a SQLite database.
///
/// # Examples
///
/// ```no_run
/// use debarchive_storage::backend::SqliteBackend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = SqliteBackend::connect("local", "/var/lib/debarchive/archive.db").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    name: String,
    pool: SqlitePool,
}

impl SqliteBackend {
    async fn new(name: String, options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let backend = Self { name, pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Connect to the archive database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(name.into(), options, None).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note: In-memory databases are destroyed when the connection closes.
    pub async fn connect_in_memory(name: impl Into<String>) -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // An in-memory database must be limited to one connection, otherwise
        // parallel connections see different databases.
        Self::new(name.into(), options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Two loader runs against the same archive each hold a writer.
            .busy_timeout(std::time::Duration::from_millis(5000))
    }

    #[instrument("performing archive migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    fn to_i64(value: u64, what: &'static str) -> Result<i64> {
        i64::try_from(value).or_raise(|| ErrorKind::InvalidData(what))
    }

    fn timestamp(value: OffsetDateTime) -> Result<String> {
        value.format(&Rfc3339).or_raise(|| ErrorKind::InvalidData("timestamp"))
    }

    fn status(value: &str) -> Result<FetchStatus> {
        match value {
            "pending" => Ok(FetchStatus::Pending),
            "success" => Ok(FetchStatus::Success),
            "failure" => Ok(FetchStatus::Failure),
            _ => exn::bail!(ErrorKind::InvalidData("fetch status")),
        }
    }

    fn status_str(status: FetchStatus) -> &'static str {
        match status {
            FetchStatus::Pending => "pending",
            FetchStatus::Success => "success",
            FetchStatus::Failure => "failure",
        }
    }

    /// Load a stored content, body included.
    pub async fn content(&self, id: &ObjectId) -> Result<Option<Content>> {
        let row: Option<(String, String, i64, String, Option<String>, Option<Vec<u8>>)> =
            sqlx::query_as("SELECT sha1, sha256, length, status, reason, data FROM content WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let Some((sha1, sha256, length, status, reason, data)) = row else {
            return Ok(None);
        };
        let status = match status.as_str() {
            "visible" => ContentStatus::Visible,
            "absent" => ContentStatus::Absent,
            _ => exn::bail!(ErrorKind::InvalidData("content status")),
        };
        Ok(Some(Content {
            id: id.clone(),
            sha1,
            sha256,
            length: u64::try_from(length).or_raise(|| ErrorKind::InvalidData("content length"))?,
            status,
            reason,
            data,
        }))
    }

    pub async fn revision(&self, id: &ObjectId) -> Result<Option<Revision>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM revision WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(|(body,)| serde_json::from_str(&body).or_raise(|| ErrorKind::InvalidData("revision")))
            .transpose()
    }

    /// Every fetch attempt recorded for an origin, oldest first.
    pub async fn attempts(&self, origin: OriginId) -> Result<Vec<FetchAttempt>> {
        let rows: Vec<(i64, String, Option<String>, String, Option<String>)> = sqlx::query_as(
            "SELECT id, started, finished, status, detail FROM fetch_history WHERE origin = ? ORDER BY id",
        )
        .bind(Self::to_i64(origin, "origin id")?)
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(id, started, finished, status, detail)| {
                Ok(FetchAttempt {
                    handle: FetchHandle(u64::try_from(id).or_raise(|| ErrorKind::InvalidData("fetch handle"))?),
                    origin,
                    started: OffsetDateTime::parse(&started, &Rfc3339).or_raise(|| ErrorKind::InvalidData("timestamp"))?,
                    finished: finished
                        .map(|f| OffsetDateTime::parse(&f, &Rfc3339).or_raise(|| ErrorKind::InvalidData("timestamp")))
                        .transpose()?,
                    status: Self::status(&status)?,
                    detail,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ArchiveBackend for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_missing_content(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let mut present = std::collections::HashSet::new();
        for chunk in ids.chunks(QUERY_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM content WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
            let rows: Vec<(String,)> =
                query.build_query_as().fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
            present.extend(rows.into_iter().map(|(id,)| id));
        }
        Ok(ids.iter().filter(|id| !present.contains(id.as_str())).cloned().collect())
    }

    async fn submit_content(&self, contents: &[Content]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for content in contents {
            sqlx::query(
                "INSERT OR IGNORE INTO content (id, sha1, sha256, length, status, reason, data) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(content.id.as_str())
            .bind(&content.sha1)
            .bind(&content.sha256)
            .bind(Self::to_i64(content.length, "content length")?)
            .bind(content.status.as_str())
            .bind(content.reason.as_deref())
            .bind(content.data.as_deref())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn submit_directories(&self, directories: &[DirectoryRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for directory in directories {
            let entries = serde_json::to_string(&directory.entries).or_raise(|| ErrorKind::InvalidData("directory"))?;
            sqlx::query("INSERT OR IGNORE INTO directory (id, entries) VALUES (?, ?)")
                .bind(directory.id.as_str())
                .bind(entries)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn submit_revisions(&self, revisions: &[Revision]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for revision in revisions {
            let body = serde_json::to_string(revision).or_raise(|| ErrorKind::InvalidData("revision"))?;
            sqlx::query("INSERT OR IGNORE INTO revision (id, directory, body) VALUES (?, ?, ?)")
                .bind(revision.id.as_str())
                .bind(revision.directory.as_str())
                .bind(body)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn submit_releases(&self, releases: &[Release]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for release in releases {
            let body = serde_json::to_string(release).or_raise(|| ErrorKind::InvalidData("release"))?;
            sqlx::query("INSERT OR IGNORE INTO release (id, target, body) VALUES (?, ?, ?)")
                .bind(release.id.as_str())
                .bind(release.target.as_str())
                .bind(body)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn submit_occurrences(&self, occurrences: &[Occurrence]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for occurrence in occurrences {
            sqlx::query(
                "INSERT OR IGNORE INTO occurrence (origin, branch, target, target_type, authority, validity) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Self::to_i64(occurrence.origin, "origin id")?)
            .bind(&occurrence.branch)
            .bind(occurrence.target.as_str())
            .bind(occurrence.target_type.as_str())
            .bind(&occurrence.authority)
            .bind(Self::timestamp(occurrence.validity)?)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn open_fetch_attempt(&self, origin: OriginId) -> Result<FetchHandle> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO fetch_history (origin, started, status) VALUES (?, ?, 'pending') RETURNING id")
                .bind(Self::to_i64(origin, "origin id")?)
                .bind(Self::timestamp(OffsetDateTime::now_utc())?)
                .fetch_one(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        Ok(FetchHandle(u64::try_from(id).or_raise(|| ErrorKind::InvalidData("fetch handle"))?))
    }

    async fn close_fetch_attempt(&self, handle: FetchHandle, outcome: FetchOutcome) -> Result<()> {
        let id = Self::to_i64(handle.0, "fetch handle")?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM fetch_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            None => exn::bail!(ErrorKind::UnknownFetchAttempt(handle)),
            Some((status,)) if Self::status(&status)? != FetchStatus::Pending => {
                exn::bail!(ErrorKind::FetchAttemptClosed(handle))
            },
            Some(_) => {},
        }
        sqlx::query("UPDATE fetch_history SET finished = ?, status = ?, detail = ? WHERE id = ?")
            .bind(Self::timestamp(OffsetDateTime::now_utc())?)
            .bind(Self::status_str(outcome.status()))
            .bind(outcome.detail())
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentRecord, DirectoryEntry, EntryKind};
    use std::path::PathBuf;

    fn record(byte: u8, length: u64) -> ContentRecord {
        ContentRecord {
            id: ObjectId::from_digest([byte; 20]),
            sha1: "sha1".into(),
            sha256: "sha256".into(),
            length,
            path: PathBuf::from("unused"),
        }
    }

    #[tokio::test]
    async fn test_content_roundtrip_and_missing() {
        let backend = SqliteBackend::connect_in_memory("test").await.unwrap();
        let visible = Content::visible(&record(1, 3), b"abc".to_vec());
        let absent = Content::absent(&record(2, 1 << 30), "Content too large");
        backend.submit_content(&[visible.clone(), absent.clone()]).await.unwrap();

        let ids = [record(1, 0).id, record(2, 0).id, record(3, 0).id];
        assert_eq!(backend.query_missing_content(&ids).await.unwrap(), vec![record(3, 0).id]);
        assert_eq!(backend.content(&visible.id).await.unwrap(), Some(visible));
        assert_eq!(backend.content(&absent.id).await.unwrap(), Some(absent));
        backend.close().await;
    }

    #[tokio::test]
    async fn test_content_is_never_overwritten() {
        let backend = SqliteBackend::connect_in_memory("test").await.unwrap();
        backend.submit_content(&[Content::visible(&record(1, 3), b"abc".to_vec())]).await.unwrap();
        backend.submit_content(&[Content::visible(&record(1, 3), b"xyz".to_vec())]).await.unwrap();
        let stored = backend.content(&record(1, 0).id).await.unwrap().unwrap();
        assert_eq!(stored.data.as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_directories_are_idempotent() {
        let backend = SqliteBackend::connect_in_memory("test").await.unwrap();
        let directory = DirectoryRecord {
            id: ObjectId::from_digest([7; 20]),
            entries: vec![DirectoryEntry {
                name: b"README".to_vec(),
                kind: EntryKind::File,
                perms: 0o100644,
                target: record(1, 0).id,
            }],
        };
        backend.submit_directories(&[directory.clone()]).await.unwrap();
        backend.submit_directories(&[directory]).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_history() {
        let backend = SqliteBackend::connect_in_memory("test").await.unwrap();
        let first = backend.open_fetch_attempt(42).await.unwrap();
        let second = backend.open_fetch_attempt(42).await.unwrap();
        backend.close_fetch_attempt(first, FetchOutcome::Success).await.unwrap();
        backend
            .close_fetch_attempt(second, FetchOutcome::Failure { detail: "extraction failed".into() })
            .await
            .unwrap();

        let attempts = backend.attempts(42).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status, FetchStatus::Success);
        assert_eq!(attempts[1].status, FetchStatus::Failure);
        assert_eq!(attempts[1].detail.as_deref(), Some("extraction failed"));

        let err = backend.close_fetch_attempt(first, FetchOutcome::Success).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FetchAttemptClosed(_)));
        let err = backend.close_fetch_attempt(FetchHandle(1000), FetchOutcome::Success).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownFetchAttempt(_)));
    }
}
