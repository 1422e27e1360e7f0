use crate::error::{ErrorKind, Result};
use crate::ids::git_object_id;
use debarchive_storage::models::{ContentRecord, DirectoryEntry, DirectoryRecord, EntryKind, ObjectId, ObjectSet};
use exn::ResultExt;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const MODE_FILE: u32 = 0o100644;
const MODE_EXECUTABLE: u32 = 0o100755;
const MODE_DIR: u32 = 0o40000;
const MODE_SYMLINK: u32 = 0o120000;
const READ_BUFFER: usize = 64 * 1024;

/// Computes the full object set of a directory tree.
///
/// Implementations must be deterministic: hashing the same tree twice yields
/// the same ids, and identical file bytes yield the same content id
/// regardless of where they live in the tree.
pub trait TreeHasher: Send + Sync {
    /// Hash every file and directory below `root`.
    ///
    /// Directories are listed children first, so the root directory is
    /// always the last entry of [`ObjectSet::directories`].
    fn compute_tree(&self, root: &Path) -> Result<ObjectSet>;
}

/// Hashes trees exactly like `git write-tree` would, byte for byte.
///
/// Unlike git, empty directories are kept (as empty trees); an extracted
/// source package is archived as found on disk. Sockets, FIFOs and device
/// files are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitTreeHasher;

impl TreeHasher for GitTreeHasher {
    #[tracing::instrument(level = "debug", skip(self), fields(path = %root.display()))]
    fn compute_tree(&self, root: &Path) -> Result<ObjectSet> {
        let metadata = fs::metadata(root).or_raise(|| ErrorKind::Io(root.to_path_buf()))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(root.to_path_buf()));
        }
        let mut contents = Vec::new();
        let mut directories = Vec::new();
        let root = hash_directory(root, &mut contents, &mut directories)?;
        tracing::debug!(contents = contents.len(), directories = directories.len(), %root, "Hashed tree");
        Ok(ObjectSet { root, contents, directories })
    }
}

fn hash_directory(path: &Path, contents: &mut Vec<ContentRecord>, directories: &mut Vec<DirectoryRecord>) -> Result<ObjectId> {
    let io_error = || ErrorKind::Io(path.to_path_buf());
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).or_raise(io_error)? {
        let entry = entry.or_raise(io_error)?;
        let child = entry.path();
        let file_type = entry.file_type().or_raise(|| ErrorKind::Io(child.clone()))?;
        let (kind, perms, target) = if file_type.is_symlink() {
            let link = fs::read_link(&child).or_raise(|| ErrorKind::Io(child.clone()))?;
            let record = hash_bytes(&child, link.as_os_str().as_bytes());
            let id = record.id.clone();
            contents.push(record);
            (EntryKind::Symlink, MODE_SYMLINK, id)
        } else if file_type.is_dir() {
            (EntryKind::Dir, MODE_DIR, hash_directory(&child, contents, directories)?)
        } else if file_type.is_file() {
            let metadata = entry.metadata().or_raise(|| ErrorKind::Io(child.clone()))?;
            let perms = if metadata.permissions().mode() & 0o111 != 0 { MODE_EXECUTABLE } else { MODE_FILE };
            let record = hash_file(&child, metadata.len())?;
            let id = record.id.clone();
            contents.push(record);
            (EntryKind::File, perms, id)
        } else {
            tracing::debug!(path = %child.display(), "Skipping special file");
            continue;
        };
        entries.push(DirectoryEntry { name: entry.file_name().as_bytes().to_vec(), kind, perms, target });
    }
    entries.sort_by(git_order);
    let id = tree_id(&entries);
    directories.push(DirectoryRecord { id: id.clone(), entries });
    Ok(id)
}

/// Digests of one content, as stored alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHashes {
    pub sha1_git: ObjectId,
    pub sha1: String,
    pub sha256: String,
}

/// Stream `reader` through every content digest in a single pass.
///
/// `length` must be the exact number of bytes `reader` yields, since git
/// frames the blob with it before any data is hashed. Each chunk is also
/// handed to `inspect`, for callers computing extra digests of their own.
pub fn hash_stream(
    mut reader: impl Read,
    length: u64,
    mut inspect: impl FnMut(&[u8]),
) -> std::io::Result<ContentHashes> {
    let mut git = Sha1::new();
    git.update(format!("blob {length}\0"));
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0; READ_BUFFER];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = &buffer[..read];
        git.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        inspect(chunk);
    }
    Ok(ContentHashes {
        sha1_git: ObjectId::from_digest(git.finalize()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
    })
}

fn hash_file(path: &Path, length: u64) -> Result<ContentRecord> {
    let io_error = || ErrorKind::Io(path.to_path_buf());
    let file = File::open(path).or_raise(io_error)?;
    let hashes = hash_stream(file, length, |_| {}).or_raise(io_error)?;
    Ok(ContentRecord {
        id: hashes.sha1_git,
        sha1: hashes.sha1,
        sha256: hashes.sha256,
        length,
        path: path.to_path_buf(),
    })
}

fn hash_bytes(path: &Path, data: &[u8]) -> ContentRecord {
    ContentRecord {
        id: git_object_id("blob", data),
        sha1: hex::encode(Sha1::digest(data)),
        sha256: hex::encode(Sha256::digest(data)),
        length: data.len() as u64,
        path: path.to_path_buf(),
    }
}

/// Git compares tree entries by name, with directory names compared as if
/// they ended in a slash.
fn git_order(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    let key = |e: &DirectoryEntry| e.name.clone().into_iter().chain((e.kind == EntryKind::Dir).then_some(b'/'));
    key(a).cmp(key(b))
}

fn tree_id(entries: &[DirectoryEntry]) -> ObjectId {
    let mut body = Vec::new();
    for entry in entries {
        body.extend_from_slice(format!("{:o} ", entry.perms).as_bytes());
        body.extend_from_slice(&entry.name);
        body.push(0);
        // Ids are produced by this crate, always valid hex.
        body.extend(hex::decode(entry.target.as_str()).unwrap_or_default());
    }
    git_object_id("tree", &body)
}

/// Read the body of a content discovered by [`GitTreeHasher`].
///
/// Symlinks are archived as their target path, not the file they point to.
pub fn read_content(record: &ContentRecord) -> Result<Vec<u8>> {
    let io_error = || ErrorKind::Io(record.path.clone());
    let metadata = fs::symlink_metadata(&record.path).or_raise(io_error)?;
    if metadata.file_type().is_symlink() {
        let link = fs::read_link(&record.path).or_raise(io_error)?;
        return Ok(link.into_os_string().into_encoded_bytes());
    }
    fs::read(&record.path).or_raise(io_error)
}
