//! Archive object model and storage backends.
//!
//! The ingestion pipeline never talks to a database directly: everything it
//! persists goes through an [`ArchiveBackend`]. Enable the `sqlite` feature
//! for a durable local archive, or `mock` for an in-memory one in tests.

pub mod backend;
pub mod error;
pub mod models;

pub use crate::backend::ArchiveBackend;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn ArchiveBackend + Send + Sync>;
