use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// Content-derived object identifier (lowercase hex digest).
///
/// Identical bytes always produce the identical id, which is what makes
/// deduplication by id safe: an id that has been archived never needs to be
/// archived again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);
impl ObjectId {
    pub fn from_digest(digest: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for ObjectId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            exn::bail!(ErrorKind::InvalidData("object id"));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}
impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A file content as discovered by the tree hasher.
///
/// This is a *shallow* record: it knows where the bytes live on disk but
/// does not hold them. Bodies are only read when the record is flushed, and
/// only if the backend reports the id as missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    /// `sha1_git` of the content (primary key)
    pub id: ObjectId,
    pub sha1: String,
    pub sha256: String,
    /// Length in bytes
    pub length: u64,
    /// Location of the bytes inside an extracted package
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Visible,
    /// Known to exist but deliberately not archived (too large).
    Absent,
}
impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Absent => "absent",
        }
    }
}

/// A full content, ready to be submitted to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub id: ObjectId,
    pub sha1: String,
    pub sha256: String,
    pub length: u64,
    pub status: ContentStatus,
    /// Why the body is missing, for [`ContentStatus::Absent`] contents.
    pub reason: Option<String>,
    pub data: Option<Vec<u8>>,
}
impl Content {
    pub fn visible(record: &ContentRecord, data: Vec<u8>) -> Self {
        Self {
            id: record.id.clone(),
            sha1: record.sha1.clone(),
            sha256: record.sha256.clone(),
            length: record.length,
            status: ContentStatus::Visible,
            reason: None,
            data: Some(data),
        }
    }

    pub fn absent(record: &ContentRecord, reason: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            sha1: record.sha1.clone(),
            sha256: record.sha256.clone(),
            length: record.length,
            status: ContentStatus::Absent,
            reason: Some(reason.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// One named entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Raw file name; Debian source trees are not guaranteed to be UTF-8.
    pub name: Vec<u8>,
    pub kind: EntryKind,
    /// Git-style mode bits (`0o100644`, `0o100755`, `0o40000`, `0o120000`)
    pub perms: u32,
    pub target: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: ObjectId,
    pub entries: Vec<DirectoryEntry>,
}

/// Every content and directory object making up one extracted package tree.
///
/// The lists may contain the same id more than once (a file duplicated
/// inside a package, for instance) until deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSet {
    /// Id of the directory at the root of the tree.
    pub root: ObjectId,
    pub contents: Vec<ContentRecord>,
    pub directories: Vec<DirectoryRecord>,
}
