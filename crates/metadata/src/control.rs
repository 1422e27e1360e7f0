use crate::consts::{CONTROL_FIELD_REGEX, SIGNATURE_HEADER, SIGNED_MESSAGE_HEADER};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::path::Path;

/// One line of the `Files` field: a file making up the source package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFileEntry {
    pub md5: String,
    pub size: u64,
    pub name: String,
}

/// A Debian source control file (`.dsc`).
///
/// Only the first deb822 paragraph is read. Field names are matched
/// case-insensitively; continuation lines are kept joined with newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFile {
    fields: BTreeMap<String, String>,
    signed: bool,
}

impl ControlFile {
    /// Parse a control file, stripping an OpenPGP cleartext signature if
    /// there is one.
    pub fn parse(text: &str) -> Result<Self> {
        let (body, signed) = strip_cleartext_signature(text)?;
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;
        for line in body.lines() {
            if line.trim().is_empty() {
                if fields.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                let Some(field) = current.as_ref().and_then(|name| fields.get_mut(name)) else {
                    exn::bail!(ErrorKind::ControlFile(format!("continuation line without a field: {line:?}")));
                };
                field.push('\n');
                field.push_str(line.trim());
                continue;
            }
            let Some(captures) = CONTROL_FIELD_REGEX.captures(line) else {
                exn::bail!(ErrorKind::ControlFile(format!("not a field: {line:?}")));
            };
            let name = captures[1].to_ascii_lowercase();
            fields.insert(name.clone(), captures[2].trim().to_string());
            current = Some(name);
        }
        if fields.is_empty() {
            exn::bail!(ErrorKind::ControlFile("empty paragraph".to_string()));
        }
        Ok(Self { fields, signed })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).or_raise(|| {
            if path.exists() { ErrorKind::Io(path.to_path_buf()) } else { ErrorKind::NotFound(path.to_path_buf()) }
        })?;
        // Control files are ASCII in practice; anything else is not worth
        // rejecting a package over.
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// Value of a field, looked up case-insensitively.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the control file was wrapped in a cleartext signature.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Entries of the `Files` field.
    pub fn files(&self) -> Result<Vec<ControlFileEntry>> {
        let Some(files) = self.field("files") else {
            return Ok(Vec::new());
        };
        files
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let invalid = || ErrorKind::ControlFile(format!("invalid Files entry: {line:?}"));
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next(), parts.next(), parts.next()) {
                    (Some(md5), Some(size), Some(name), None) => Ok(ControlFileEntry {
                        md5: md5.to_string(),
                        size: size.parse::<u64>().or_raise(invalid)?,
                        name: name.to_string(),
                    }),
                    _ => exn::bail!(invalid()),
                }
            })
            .collect()
    }
}

/// Return the signed text of a cleartext-signed message, or the input
/// unchanged if it isn't signed.
fn strip_cleartext_signature(text: &str) -> Result<(String, bool)> {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty()).peekable();
    if lines.peek().map(|line| line.trim_end()) != Some(SIGNED_MESSAGE_HEADER) {
        return Ok((text.to_string(), false));
    }
    // Armor headers (`Hash: SHA512`) run until the first blank line.
    let lines = lines.skip(1).skip_while(|line| !line.trim().is_empty()).skip(1);
    let mut body = String::new();
    for line in lines {
        if line.trim_end() == SIGNATURE_HEADER {
            return Ok((body, true));
        }
        body.push_str(line.strip_prefix("- ").unwrap_or(line));
        body.push('\n');
    }
    exn::bail!(ErrorKind::ControlFile("signed message without a signature block".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DSC: &str = "\
Format: 3.0 (quilt)
Source: hello
Binary: hello
Version: 2.10-3
Maintainer: Jane Doe <jane@example.org>
Checksums-Sha256:
 31e066137a962676e89f69d1b65382de95a7ef7d914b8cb956f41ea72e0f516b 725946 hello_2.10.orig.tar.gz
Files:
 6cd0ffea3884a4e79330338dcc2987d6 725946 hello_2.10.orig.tar.gz
 e7bd195571b19d33bd83d1c379fe6432 12688 hello_2.10-3.debian.tar.xz
";

    #[test]
    fn test_parse_unsigned() {
        let control = ControlFile::parse(DSC).unwrap();
        assert!(!control.is_signed());
        assert_eq!(control.field("Source"), Some("hello"));
        assert_eq!(control.field("VERSION"), Some("2.10-3"));
        let files = control.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 725946);
        assert_eq!(files[1].name, "hello_2.10-3.debian.tar.xz");
        assert_eq!(files[1].md5, "e7bd195571b19d33bd83d1c379fe6432");
    }

    #[test]
    fn test_parse_signed() {
        let signed = format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\n{DSC}- -dashed: value\n\n-----BEGIN PGP SIGNATURE-----\n\niQIzBAEBCgAdFiEE\n-----END PGP SIGNATURE-----\n"
        );
        let control = ControlFile::parse(&signed).unwrap();
        assert!(control.is_signed());
        assert_eq!(control.field("source"), Some("hello"));
        assert_eq!(control.field("-dashed"), Some("value"));
        assert_eq!(control.files().unwrap().len(), 2);
    }

    #[rstest]
    #[case("")]
    #[case(" leading continuation\n")]
    #[case("no colon here\n")]
    #[case("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nSource: hello\n")]
    fn test_malformed(#[case] input: &str) {
        let err = ControlFile::parse(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ControlFile(_)));
    }

    #[rstest]
    #[case("Files:\n 6cd0ffea 725946\n")]
    #[case("Files:\n 6cd0ffea notanumber hello.tar.gz\n")]
    fn test_invalid_files(#[case] input: &str) {
        let err = ControlFile::parse(input).unwrap().files().unwrap_err();
        assert!(matches!(&*err, ErrorKind::ControlFile(_)));
    }

    #[test]
    fn test_no_files_field() {
        let control = ControlFile::parse("Source: hello\n").unwrap();
        assert!(control.files().unwrap().is_empty());
    }
}
