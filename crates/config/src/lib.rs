//! Configuration for debarchive.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. a configuration file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed `DEBARCHIVE_`, with `__` separating
//!    nested keys (`DEBARCHIVE_FLUSH__CONTENT_PACKET_SIZE=5000`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DEBARCHIVE_";
pub const DEFAULT_KEYRING_DIR: &str = "/usr/share/keyrings";

/// When accumulated objects get written to the archive.
///
/// A flush happens as soon as *any* threshold is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushThresholds {
    /// Number of pending contents.
    pub content_packet_size: usize,
    /// Cumulative length of pending contents, oversized ones excluded.
    pub content_packet_length: u64,
    /// Contents longer than this are archived without their body.
    pub content_max_length_one: u64,
    /// Number of pending directories.
    pub directory_packet_size: usize,
}
impl Default for FlushThresholds {
    fn default() -> Self {
        Self {
            content_packet_size: 10_000,
            content_packet_length: 1 << 40,
            content_max_length_one: 100 << 20,
            directory_packet_size: 25_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub flush: FlushThresholds,
    /// Keyring files, or directories whose files are all keyrings.
    pub keyrings: Vec<PathBuf>,
    /// Where per-run temporary directories are created; the system default
    /// if unset.
    pub temp_dir: Option<PathBuf>,
    /// Path to `dpkg-source`; looked up on `PATH` if unset.
    pub unpacker: Option<PathBuf>,
    /// Authority vouching for the occurrences recorded by a run.
    pub authority: Option<String>,
    /// Query the archive but never write to it.
    pub dry_run: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            flush: FlushThresholds::default(),
            keyrings: vec![PathBuf::from(DEFAULT_KEYRING_DIR)],
            temp_dir: None,
            unpacker: None,
            authority: None,
            dry_run: false,
        }
    }
}

impl Config {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "debarchive", "debarchive").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build the layered provider chain.
    ///
    /// An explicit `path` must exist; without one, the file at
    /// [`default_path`](Self::default_path) is used if present.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let path = match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        };
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(&path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&path)),
                Some("json") => figment.merge(Json::file_exact(&path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path)?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let flush = &self.flush;
        if flush.content_packet_size == 0 || flush.directory_packet_size == 0 {
            exn::bail!(ErrorKind::Invalid("packet sizes must be greater than zero"));
        }
        if flush.content_packet_length == 0 || flush.content_max_length_one == 0 {
            exn::bail!(ErrorKind::Invalid("content lengths must be greater than zero"));
        }
        if flush.content_max_length_one > flush.content_packet_length {
            exn::bail!(ErrorKind::Invalid("content_max_length_one exceeds content_packet_length"));
        }
        if self.authority.as_deref().is_some_and(|a| a.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("authority must not be empty"));
        }
        Ok(())
    }

    /// Every keyring file, with directories expanded to the files they
    /// contain. Missing locations are skipped.
    pub fn keyring_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for location in &self.keyrings {
            if location.is_file() {
                files.push(location.clone());
                continue;
            }
            let Ok(entries) = fs::read_dir(location) else {
                tracing::warn!(keyring = %location.display(), "Keyring location is not readable; skipping");
                continue;
            };
            let mut found: Vec<_> = entries.flatten().map(|e| e.path()).filter(|p| p.is_file()).collect();
            found.sort();
            files.extend(found);
        }
        files
    }
}
