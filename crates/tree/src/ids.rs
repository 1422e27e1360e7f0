use debarchive_storage::models::{ObjectId, ObjectType, Person, Release, Revision};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

/// Hash an object body framed as a git loose object (`<kind> <len>\0<body>`).
pub(crate) fn git_object_id(kind: &str, body: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{kind} {}\0", body.len()));
    hasher.update(body);
    ObjectId::from_digest(hasher.finalize())
}

/// Content id of raw bytes.
pub fn blob_id(data: &[u8]) -> ObjectId {
    git_object_id("blob", data)
}

fn identity(person: &Person) -> String {
    match (&person.fullname, &person.name, &person.email) {
        (Some(fullname), _, _) => fullname.clone(),
        (None, name, email) => {
            format!("{} <{}>", name.as_deref().unwrap_or_default(), email.as_deref().unwrap_or_default())
        },
    }
}

fn signature(person: &Person, date: OffsetDateTime) -> String {
    let offset = date.offset();
    let sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "{} {} {sign}{:02}{:02}",
        identity(person),
        date.unix_timestamp(),
        offset.whole_hours().unsigned_abs(),
        offset.minutes_past_hour().unsigned_abs(),
    )
}

/// Id of a revision, computed over a git commit manifest of its fields.
///
/// The `id` field of `revision` itself is ignored.
pub fn revision_id(revision: &Revision) -> ObjectId {
    let mut manifest = format!("tree {}\n", revision.directory);
    for parent in &revision.parents {
        manifest.push_str(&format!("parent {parent}\n"));
    }
    manifest.push_str(&format!("author {}\n", signature(&revision.author, revision.date)));
    manifest.push_str(&format!("committer {}\n", signature(&revision.committer, revision.committer_date)));
    manifest.push('\n');
    manifest.push_str(&revision.message);
    git_object_id("commit", manifest.as_bytes())
}

/// Id of a release, computed over a git tag manifest of its fields.
///
/// The `id` field of `release` itself is ignored.
pub fn release_id(release: &Release) -> ObjectId {
    let kind = match release.target_type {
        ObjectType::Revision => "commit",
        ObjectType::Directory => "tree",
        ObjectType::Content => "blob",
        ObjectType::Release => "tag",
    };
    let manifest = format!(
        "object {}\ntype {kind}\ntag {}\ntagger {}\n\n{}",
        release.target,
        release.name,
        signature(&release.author, release.date),
        release.message,
    );
    git_object_id("tag", manifest.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use debarchive_storage::models::{PackageRef, RevisionMetadata, RevisionType};
    use rstest::rstest;
    use time::macros::datetime;

    fn revision() -> Revision {
        let person: Person = "Jane Doe <jane@example.org>".parse().unwrap();
        Revision {
            id: blob_id(b"placeholder"),
            directory: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap(),
            message: "Synthetic revision for Debian source package hello version 2.10-3".into(),
            author: person.clone(),
            date: datetime!(2022-10-09 13:05:00 +02:00),
            committer: person,
            committer_date: datetime!(2022-10-10 08:00:00 UTC),
            kind: RevisionType::Dsc,
            synthetic: true,
            parents: vec![],
            metadata: RevisionMetadata {
                package: PackageRef { name: "hello".into(), version: "2.10-3".into() },
                history: vec![],
                original_artifact: vec![],
                signing_key: None,
            },
        }
    }

    #[rstest]
    #[case(b"", "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")]
    #[case(b"hello\n", "ce013625030ba8dba906f756967f9e9ca394464a")]
    fn test_blob_id(#[case] data: &[u8], #[case] expected: &str) {
        assert_eq!(blob_id(data).as_str(), expected);
    }

    #[rstest]
    #[case(datetime!(2022-10-09 13:05:00 +02:00), "1665313500 +0200")]
    #[case(datetime!(2022-10-09 13:05:00 -05:30), "1665340500 -0530")]
    #[case(datetime!(2022-10-09 13:05:00 UTC), "1665320700 +0000")]
    fn test_signature_format(#[case] date: OffsetDateTime, #[case] expected: &str) {
        let person: Person = "Jane Doe <jane@example.org>".parse().unwrap();
        assert_eq!(signature(&person, date), format!("Jane Doe <jane@example.org> {expected}"));
    }

    #[test]
    fn test_revision_id_ignores_own_id() {
        let mut other = revision();
        other.id = blob_id(b"something else");
        assert_eq!(revision_id(&revision()), revision_id(&other));
    }

    #[test]
    fn test_revision_id_depends_on_tree() {
        let mut other = revision();
        other.directory = blob_id(b"different tree");
        assert_ne!(revision_id(&revision()), revision_id(&other));
    }

    #[test]
    fn test_release_id_depends_on_target() {
        let release = Release {
            id: blob_id(b"placeholder"),
            name: "2.10-3".into(),
            target: revision_id(&revision()),
            target_type: ObjectType::Revision,
            message: "Synthetic release for Debian source package hello version 2.10-3".into(),
            author: Person::default(),
            date: datetime!(2022-10-10 08:00:00 UTC),
        };
        let mut other = release.clone();
        other.target = blob_id(b"another revision");
        assert_ne!(release_id(&release), release_id(&other));
        other.target = release.target.clone();
        assert_eq!(release_id(&release), release_id(&other));
    }
}
