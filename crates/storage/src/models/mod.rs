//! Archive models.
//!
//! These types are what the ingestion pipeline hands to an
//! [`ArchiveBackend`](crate::ArchiveBackend): file contents and directory
//! listings keyed by content-derived ids, the synthetic revisions, releases
//! and occurrences built from each package, and the fetch-attempt log.

mod fetch;
mod object;
mod person;
mod revision;

pub use self::fetch::{FetchAttempt, FetchHandle, FetchOutcome, FetchStatus, OriginId};
pub use self::object::{
    Content, ContentRecord, ContentStatus, DirectoryEntry, DirectoryRecord, EntryKind, ObjectId, ObjectSet,
};
pub use self::person::Person;
pub use self::revision::{
    Authority, ObjectType, Occurrence, OriginalArtifact, PackageRef, Release, Revision, RevisionMetadata,
    RevisionType,
};
