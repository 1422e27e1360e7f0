use crate::consts::{CHANGELOG_HEADER_REGEX, CHANGELOG_TRAILER_REGEX, WHITESPACE_REGEX};
use crate::encoding::decode_with_fallback;
use crate::error::{ErrorKind, Result};
use debarchive_storage::models::Person;
use exn::{OptionExt, ResultExt};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

/// One upload recorded in `debian/changelog`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub package: String,
    pub version: String,
    pub distributions: Vec<String>,
    pub author: Person,
    /// Date of the upload, in the offset it was written with.
    pub date: OffsetDateTime,
}

/// A parsed Debian changelog, newest entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changelog {
    entries: Vec<ChangelogEntry>,
}

impl Changelog {
    /// Parse changelog text.
    ///
    /// Blank lines between entries and anything after the last complete
    /// entry are ignored. At least one complete entry is required.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut open: Option<(String, String, Vec<String>)> = None;
        for (number, line) in text.lines().enumerate() {
            if let Some(captures) = CHANGELOG_TRAILER_REGEX.captures(line) {
                let Some((package, version, distributions)) = open.take() else {
                    exn::bail!(ErrorKind::Changelog(format!("line {}: trailer without an entry", number + 1)));
                };
                let date = WHITESPACE_REGEX.replace_all(&captures[2], " ");
                let date = OffsetDateTime::parse(&date, &Rfc2822)
                    .or_raise(|| ErrorKind::Changelog(format!("line {}: invalid date {date:?}", number + 1)))?;
                entries.push(ChangelogEntry {
                    package,
                    version,
                    distributions,
                    author: captures[1].parse().unwrap_or_default(),
                    date,
                });
            } else if let Some(captures) = CHANGELOG_HEADER_REGEX.captures(line) {
                if open.is_some() {
                    exn::bail!(ErrorKind::Changelog(format!("line {}: entry without a trailer", number + 1)));
                }
                let distributions = captures[3].split_whitespace().map(str::to_string).collect();
                open = Some((captures[1].to_string(), captures[2].to_string(), distributions));
            }
        }
        if entries.is_empty() {
            exn::bail!(ErrorKind::Changelog("no complete entry".to_string()));
        }
        Ok(Self { entries })
    }

    /// Read and parse a changelog file, retrying as ISO-8859-15 if it is not
    /// valid UTF-8.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).or_raise(|| {
            if path.exists() { ErrorKind::Io(path.to_path_buf()) } else { ErrorKind::NotFound(path.to_path_buf()) }
        })?;
        Self::parse(&decode_with_fallback(bytes, path)?)
    }

    pub fn entries(&self) -> &[ChangelogEntry] {
        &self.entries
    }

    /// The most recent upload.
    pub fn latest(&self) -> Result<&ChangelogEntry> {
        self.entries.first().ok_or_raise(|| ErrorKind::Changelog("no complete entry".to_string()))
    }

    /// `(package, version)` of every entry, oldest first.
    pub fn history(&self) -> Vec<(String, String)> {
        self.entries.iter().rev().map(|e| (e.package.clone(), e.version.clone())).collect()
    }
}
