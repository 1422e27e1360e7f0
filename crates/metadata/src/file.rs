use crate::error::{ErrorKind, Result};
use debarchive_tree::hash_stream;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

/// Name, hashes and length of one original source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    /// Algorithm name (`sha1`, `sha1_git`, `sha256`, `blake3`) to lowercase
    /// hex digest.
    pub hashes: BTreeMap<String, String>,
    pub length: u64,
}

/// Hash a file on disk.
///
/// Source tarballs can be large, so the file is streamed rather than read
/// whole.
pub fn file_info(path: &Path) -> Result<FileInfo> {
    let io_error = || ErrorKind::Io(path.to_path_buf());
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
        },
        Err(err) => return Err(err).or_raise(io_error),
    };
    let length = metadata.len();

    let mut blake3 = blake3::Hasher::new();
    let file = File::open(path).or_raise(io_error)?;
    let digests = hash_stream(file, length, |chunk| {
        blake3.update(chunk);
    })
    .or_raise(io_error)?;

    let hashes = BTreeMap::from([
        ("sha1".to_string(), digests.sha1),
        ("sha1_git".to_string(), digests.sha1_git.to_string()),
        ("sha256".to_string(), digests.sha256),
        ("blake3".to_string(), blake3.finalize().to_hex().to_string()),
    ]);
    Ok(FileInfo {
        name: path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default(),
        hashes,
        length,
    })
}
