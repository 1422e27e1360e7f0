//! Fixtures shared by the loader tests.

use crate::process::{PackageDescriptor, Unpacker};
use debarchive_metadata::{GpgStatus, SignatureVerifier};
use debarchive_storage::models::{ContentRecord, DirectoryRecord, ObjectId, OriginId};
use debarchive_tree::blob_id;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A shallow content record that points nowhere.
pub(crate) fn content(byte: u8, length: u64) -> ContentRecord {
    ContentRecord {
        id: ObjectId::from_digest([byte; 20]),
        sha1: format!("sha1-{byte}"),
        sha256: format!("sha256-{byte}"),
        length,
        path: PathBuf::from(format!("/nonexistent/{byte}")),
    }
}

/// A content record backed by a real file.
pub(crate) fn file_content(dir: &Path, name: &str, data: &[u8]) -> ContentRecord {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    ContentRecord {
        id: blob_id(data),
        sha1: String::new(),
        sha256: String::new(),
        length: data.len() as u64,
        path,
    }
}

pub(crate) fn directory(byte: u8) -> DirectoryRecord {
    DirectoryRecord { id: ObjectId::from_digest([byte; 20]), entries: Vec::new() }
}

/// Reports every message as validly signed by Jane Doe.
pub(crate) struct StubVerifier;
impl SignatureVerifier for StubVerifier {
    fn verify(&self, _message: &[u8]) -> debarchive_metadata::error::Result<GpgStatus> {
        Ok(GpgStatus::parse(
            "[GNUPG:] GOODSIG 89ABCDEF Jane Doe <jane@example.org>\n[GNUPG:] VALIDSIG FPR 2022-10-10 1665388800\n",
        ))
    }
}

/// Stands in for `dpkg-source -x`: copies the pre-extracted tree stored
/// next to the control file.
pub(crate) fn copy_unpacker() -> Unpacker {
    Unpacker::with_args("sh", ["-c", r#"cp -R "${1%.dsc}.src" "$2""#, "unpack"])
}

/// Fails like `dpkg-source` does on a corrupt package, leaving a partial
/// staging directory behind.
pub(crate) fn failing_unpacker() -> Unpacker {
    Unpacker::with_args("sh", ["-c", r#"mkdir "$2"; echo "dpkg-source: error: corrupt tarball" >&2; exit 2"#, "unpack"])
}

/// A directory laid out like a package mirror.
pub(crate) struct Mirror {
    pub(crate) root: TempDir,
}

impl Mirror {
    pub(crate) fn new() -> Self {
        Self { root: TempDir::new().unwrap() }
    }

    /// Add a package whose source tree holds a changelog plus `files`.
    pub(crate) fn add(&self, name: &str, version: &str, origin: OriginId, files: &[(&str, &[u8])]) -> PackageDescriptor {
        let stem = format!("{name}_{version}");
        let root = self.root.path();
        let orig = format!("{stem}.orig.tar.gz");
        let orig_data = format!("{name} {version} orig");
        fs::write(root.join(&orig), &orig_data).unwrap();
        let control = root.join(format!("{stem}.dsc"));
        fs::write(
            &control,
            format!("Source: {name}\nVersion: {version}\nFiles:\n 00 {} {orig}\n", orig_data.len()),
        )
        .unwrap();

        let tree = root.join(format!("{stem}.src"));
        fs::create_dir_all(tree.join("debian")).unwrap();
        fs::write(
            tree.join("debian/changelog"),
            format!(
                "{name} ({version}) unstable; urgency=low\n\n  * Release.\n\n -- Jane Doe <jane@example.org>  Sun, 09 Oct 2022 13:05:00 +0200\n"
            ),
        )
        .unwrap();
        for (path, data) in files {
            let path = tree.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, data).unwrap();
        }
        PackageDescriptor { name: name.to_string(), version: version.to_string(), control, origin }
    }
}
