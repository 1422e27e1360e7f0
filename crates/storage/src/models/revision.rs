use super::{ObjectId, OriginId, Person};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Content,
    Directory,
    Revision,
    Release,
}
impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Directory => "directory",
            Self::Revision => "revision",
            Self::Release => "release",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionType {
    /// Synthesized from a Debian source control file.
    Dsc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

/// One file that made up the original source package (the `.dsc` itself,
/// the orig tarball, the debian tarball or diff...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalArtifact {
    pub name: String,
    pub length: u64,
    /// Hash algorithm name to lowercase hex digest.
    pub hashes: BTreeMap<String, String>,
}

/// Provenance attached to a synthetic revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    pub package: PackageRef,
    /// `(package, version)` pairs, oldest first.
    pub history: Vec<(String, String)>,
    pub original_artifact: Vec<OriginalArtifact>,
    /// Key id or fingerprint of the key that signed the control file.
    pub signing_key: Option<String>,
}

/// A synthetic revision pointing at the root directory of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: ObjectId,
    pub directory: ObjectId,
    pub message: String,
    /// Taken from the latest changelog entry.
    pub author: Person,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Taken from the control file signature.
    pub committer: Person,
    #[serde(with = "time::serde::rfc3339")]
    pub committer_date: OffsetDateTime,
    #[serde(rename = "type")]
    pub kind: RevisionType,
    pub synthetic: bool,
    pub parents: Vec<ObjectId>,
    pub metadata: RevisionMetadata,
}

/// A synthetic release naming a revision after the package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ObjectId,
    pub name: String,
    pub target: ObjectId,
    pub target_type: ObjectType,
    pub message: String,
    pub author: Person,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// Who vouches for an occurrence, and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// Authority identifier (a UUID string).
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub validity: OffsetDateTime,
}

/// A named pointer recording which revision was observed for an origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub origin: OriginId,
    pub branch: String,
    pub target: ObjectId,
    pub target_type: ObjectType,
    pub authority: String,
    #[serde(with = "time::serde::rfc3339")]
    pub validity: OffsetDateTime,
}
