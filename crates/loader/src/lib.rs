//! Ingestion pipeline for Debian source packages.
//!
//! Packages flow through four stages:
//!
//! 1. [`PackageProcessor`] extracts each package and hashes its tree,
//! 2. [`ObjectAccumulator`] deduplicates contents and directories across
//!    the whole run,
//! 3. [`maybe_flush`] writes accumulated objects to the archive whenever a
//!    threshold is reached,
//! 4. [`IngestionSession`] wraps the run, recording one fetch attempt per
//!    origin and guaranteeing the temporary tree is removed.

mod accumulator;
pub mod converters;
pub mod error;
mod flush;
mod process;
mod session;
#[cfg(test)]
mod testing;

pub use crate::accumulator::{ObjectAccumulator, dedup_within};
pub use crate::flush::{FlushReport, maybe_flush, should_flush};
pub use crate::process::{PackageDescriptor, PackageProcessor, PartialResult, ProcessAll, ProcessedPackage, Unpacker};
pub use crate::session::{IngestionSession, RunOutcome, SessionState};
pub use debarchive_config::FlushThresholds;
