//! Git-compatible hashing of extracted package trees.
//!
//! Every object the archive stores is keyed by its `sha1_git`: the SHA-1 of
//! the object body framed the way git frames loose objects. Identical file
//! bytes therefore always map to the same content id, no matter which
//! package or path they came from.

pub mod error;
mod hasher;
mod ids;

pub use crate::hasher::{ContentHashes, GitTreeHasher, TreeHasher, hash_stream, read_content};
pub use crate::ids::{blob_id, release_id, revision_id};
