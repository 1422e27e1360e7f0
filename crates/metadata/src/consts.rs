use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// `hello (2.10-3) unstable; urgency=medium`
regex!(CHANGELOG_HEADER_REGEX, r"^(\w[-+0-9a-z.]*) \(([^() \t]+)\)((?:\s+[-+0-9a-zA-Z.]+)+);(.*)$");
// ` -- Jane Doe <jane@example.org>  Sun, 09 Oct 2022 13:05:00 +0200`
regex!(CHANGELOG_TRAILER_REGEX, r"^ -- (.*<[^>]*>)\s+(\S.*?)\s*$");
regex!(WHITESPACE_REGEX, r"\s+");
regex!(CONTROL_FIELD_REGEX, r"^([^\s:#][^\s:]*):(.*)$");

pub(crate) const SIGNED_MESSAGE_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
pub(crate) const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";
