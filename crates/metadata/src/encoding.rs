use crate::error::{ErrorKind, Result};
use std::path::Path;

/// Decode ISO-8859-15 (Latin-9) text.
///
/// Latin-9 is Latin-1 with eight code points swapped out, most notably the
/// euro sign at `0xA4`. Returns `None` for bytes in the C1 control range
/// `0x80..=0x9F`, which never occur in real Latin-9 text and usually mean
/// the input was something else entirely (Windows-1252, for instance).
pub fn decode_latin9(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .map(|&byte| match byte {
            0x80..=0x9F => None,
            0xA4 => Some('\u{20AC}'),
            0xA6 => Some('\u{0160}'),
            0xA8 => Some('\u{0161}'),
            0xB4 => Some('\u{017D}'),
            0xB8 => Some('\u{017E}'),
            0xBC => Some('\u{0152}'),
            0xBD => Some('\u{0153}'),
            0xBE => Some('\u{0178}'),
            _ => Some(char::from(byte)),
        })
        .collect()
}

/// Decode text as UTF-8, falling back to ISO-8859-15 once.
///
/// The fallback is logged but not an error: plenty of old changelogs were
/// written in Latin-9.
pub(crate) fn decode_with_fallback(bytes: Vec<u8>, path: &Path) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            tracing::warn!(path = %path.display(), "Unknown encoding; falling back to ISO-8859-15");
            match decode_latin9(err.as_bytes()) {
                Some(text) => Ok(text),
                None => exn::bail!(ErrorKind::Encoding(path.to_path_buf())),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"plain ascii", "plain ascii")]
    #[case(b"Ren\xe9", "René")]
    #[case(b"\xa4 100", "€ 100")]
    #[case(b"\xa6koda \xbeaut", "Škoda Ÿaut")]
    fn test_decode_latin9(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(decode_latin9(input).as_deref(), Some(expected));
    }

    #[test]
    fn test_decode_latin9_rejects_c1_controls() {
        assert_eq!(decode_latin9(b"smart \x93quotes\x94"), None);
    }

    #[test]
    fn test_utf8_is_preferred() {
        let text = decode_with_fallback("René".as_bytes().to_vec(), Path::new("changelog")).unwrap();
        assert_eq!(text, "René");
    }

    #[test]
    fn test_fallback_failure_is_fatal() {
        let err = decode_with_fallback(b"\x80\x81".to_vec(), Path::new("changelog")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Encoding(_)));
    }
}
