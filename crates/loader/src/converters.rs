//! Conversions from processed packages to the synthetic history objects
//! recorded once a run has flushed all of its trees.

use crate::process::ProcessedPackage;
use debarchive_storage::models::{
    Authority, ObjectId, ObjectType, Occurrence, OriginalArtifact, PackageRef, Release, Revision, RevisionMetadata,
    RevisionType,
};
use debarchive_tree::{release_id, revision_id};

/// The revision recording the tree of `package`.
pub fn package_to_revision(package: &ProcessedPackage) -> Revision {
    let descriptor = &package.descriptor;
    let metadata = &package.metadata;
    let original_artifact = metadata
        .source_files
        .iter()
        .map(|file| OriginalArtifact { name: file.name.clone(), length: file.length, hashes: file.hashes.clone() })
        .collect();
    let mut revision = Revision {
        id: package.directory.clone(),
        directory: package.directory.clone(),
        message: format!(
            "Synthetic revision for Debian source package {} version {}",
            descriptor.name, descriptor.version
        ),
        author: metadata.author.clone(),
        date: metadata.author_date,
        committer: metadata.committer.clone(),
        committer_date: metadata.committer_date,
        kind: RevisionType::Dsc,
        synthetic: true,
        parents: Vec::new(),
        metadata: RevisionMetadata {
            package: PackageRef { name: descriptor.name.clone(), version: descriptor.version.clone() },
            history: metadata.history.clone(),
            original_artifact,
            signing_key: Some(metadata.signing_key.clone()).filter(|key| !key.is_empty()),
        },
    };
    revision.id = revision_id(&revision);
    revision
}

/// The release naming `revision` after its package version.
pub fn revision_to_release(revision: &Revision) -> Release {
    let package = &revision.metadata.package;
    let mut release = Release {
        id: revision.id.clone(),
        name: package.version.clone(),
        target: revision.id.clone(),
        target_type: ObjectType::Revision,
        message: format!("Synthetic release for Debian source package {} version {}", package.name, package.version),
        author: revision.committer.clone(),
        date: revision.committer_date,
    };
    release.id = release_id(&release);
    release
}

/// Record that `revision` was seen for `package`'s origin.
pub fn occurrence(package: &ProcessedPackage, revision: &ObjectId, authority: &Authority) -> Occurrence {
    Occurrence {
        origin: package.descriptor.origin,
        branch: package.descriptor.version.clone(),
        target: revision.clone(),
        target_type: ObjectType::Revision,
        authority: authority.id.clone(),
        validity: authority.validity,
    }
}
