//! Signature verification of control files.
//!
//! Verification results are expressed as a [`GpgStatus`], the keyword to
//! fields record `gpg --status-fd` prints. Debian tooling has spoken that
//! format for decades, and it keeps the choice of signer identity
//! independent of the OpenPGP implementation doing the actual work.

use crate::consts::SIGNED_MESSAGE_HEADER;
use crate::error::{ErrorKind, Result};
use debarchive_storage::models::Person;
use exn::OptionExt;
use openpgp::cert::CertParser;
use openpgp::cert::amalgamation::ValidAmalgamation;
use openpgp::packet::Signature;
use openpgp::parse::Parse;
use openpgp::parse::stream::{
    GoodChecksum, MessageLayer, MessageStructure, VerificationError, VerificationHelper, VerifierBuilder,
};
use openpgp::policy::StandardPolicy;
use openpgp::{Cert, KeyHandle};
use sequoia_openpgp as openpgp;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use time::OffsetDateTime;

/// Identity keywords, in the order a signer's uid is looked up.
const UID_KEYWORDS: [&str; 5] = ["GOODSIG", "EXPSIG", "EXPKEYSIG", "REVKEYSIG", "BADSIG"];
const STATUS_PREFIX: &str = "[GNUPG:] ";

/// A `gpg --status-fd` style verification record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgStatus(BTreeMap<String, Vec<String>>);

impl GpgStatus {
    /// Parse status output as printed by `gpg`/`gpgv --status-fd`.
    ///
    /// The fields of identity keywords are split once, so that the uid
    /// stays a single field. Lines without the `[GNUPG:]` prefix are ignored.
    pub fn parse(output: &str) -> Self {
        let mut status = Self::default();
        for line in output.lines() {
            let Some(line) = line.strip_prefix(STATUS_PREFIX) else {
                continue;
            };
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
            let fields = if UID_KEYWORDS.contains(&keyword) {
                match rest.split_once(' ') {
                    Some((key_id, uid)) => vec![key_id.to_string(), uid.to_string()],
                    None => vec![rest.to_string()],
                }
            } else {
                rest.split_whitespace().map(str::to_string).collect()
            };
            status.insert(keyword, fields);
        }
        status
    }

    pub fn insert(&mut self, keyword: impl Into<String>, fields: Vec<String>) {
        self.0.insert(keyword.into(), fields);
    }

    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.0.get(keyword).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Who signed a control file, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    /// Signature creation time, always UTC.
    pub date: OffsetDateTime,
    pub key_id: String,
    /// Unknown when the signature could not be verified.
    pub signer: Person,
}

/// Extract the signature date, key and signer from a verification record.
///
/// A valid signature is preferred; a signature that could not be checked
/// (missing key, for instance) is used as a fallback. The signer identity is
/// only resolved for a valid signature.
pub fn signature_info(status: &GpgStatus) -> Result<SignatureInfo> {
    let (key_id, timestamp, signer) = if let Some(fields) = status.get("VALIDSIG") {
        let signer = UID_KEYWORDS
            .iter()
            .find_map(|keyword| status.get(keyword))
            .and_then(|fields| fields.last())
            .map(|uid| uid.parse::<Person>().unwrap_or_default())
            .unwrap_or_default();
        (fields.first(), fields.get(2), signer)
    } else if let Some(fields) = status.get("ERRSIG") {
        (fields.first(), fields.get(4), Person::default())
    } else {
        exn::bail!(ErrorKind::MissingSignature);
    };
    let key_id = key_id.ok_or_raise(|| ErrorKind::Verification("status record without a key id".to_string()))?;
    let timestamp = timestamp
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
        .ok_or_raise(|| ErrorKind::Verification("status record without a valid timestamp".to_string()))?;
    Ok(SignatureInfo { date: timestamp, key_id: key_id.clone(), signer })
}

/// Verifies the OpenPGP cleartext signature of a control file.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `message`, returning the verification record.
    ///
    /// An unsigned message yields an empty record, not an error: whether a
    /// missing signature is fatal is for [`signature_info`] to decide.
    fn verify(&self, message: &[u8]) -> Result<GpgStatus>;
}

/// Verifies signatures against the certificates of a set of keyrings.
pub struct KeyringVerifier {
    certs: Vec<Cert>,
    policy: StandardPolicy<'static>,
}

impl KeyringVerifier {
    pub fn new(certs: Vec<Cert>) -> Self {
        Self { certs, policy: StandardPolicy::new() }
    }

    /// Load every certificate from the given keyring files.
    ///
    /// Unreadable keyrings and unparseable certificates are skipped.
    pub fn from_keyrings(keyrings: &[impl AsRef<Path>]) -> Self {
        let mut certs = Vec::new();
        for keyring in keyrings {
            let keyring = keyring.as_ref();
            let parser = match CertParser::from_file(keyring) {
                Ok(parser) => parser,
                Err(err) => {
                    tracing::warn!(keyring = %keyring.display(), error = %err, "Skipping unreadable keyring");
                    continue;
                },
            };
            for cert in parser {
                match cert {
                    Ok(cert) => certs.push(cert),
                    Err(err) => tracing::warn!(keyring = %keyring.display(), error = %err, "Skipping invalid certificate"),
                }
            }
        }
        tracing::debug!(keyrings = keyrings.len(), certs = certs.len(), "Loaded keyrings");
        Self::new(certs)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl SignatureVerifier for KeyringVerifier {
    fn verify(&self, message: &[u8]) -> Result<GpgStatus> {
        if !message.trim_ascii_start().starts_with(SIGNED_MESSAGE_HEADER.as_bytes()) {
            return Ok(GpgStatus::default());
        }
        let collector = StatusCollector { certs: &self.certs, status: GpgStatus::default() };
        let mut verifier = VerifierBuilder::from_bytes(message)
            .and_then(|builder| builder.with_policy(&self.policy, None, collector))
            .map_err(|err| exn::Exn::from(ErrorKind::Verification(err.to_string())))?;
        io::copy(&mut verifier, &mut io::sink())
            .map_err(|err| exn::Exn::from(ErrorKind::Verification(err.to_string())))?;
        Ok(verifier.into_helper().status)
    }
}

struct StatusCollector<'a> {
    certs: &'a [Cert],
    status: GpgStatus,
}

impl StatusCollector<'_> {
    fn good(&mut self, checksum: &GoodChecksum<'_>) {
        let (sig, ka) = (checksum.sig, &checksum.ka);
        let timestamp = creation_time(sig);
        let date = OffsetDateTime::from_unix_timestamp(timestamp).map(|d| d.date().to_string()).unwrap_or_default();
        if let Ok(uid) = ka.cert().primary_userid() {
            let uid = String::from_utf8_lossy(uid.userid().value()).into_owned();
            self.status.insert("GOODSIG", vec![ka.key().keyid().to_hex(), uid]);
        }
        self.status.insert(
            "VALIDSIG",
            vec![
                ka.key().fingerprint().to_hex(),
                date,
                timestamp.to_string(),
                "0".to_string(),
                sig.version().to_string(),
                "0".to_string(),
                u8::from(sig.pk_algo()).to_string(),
                u8::from(sig.hash_algo()).to_string(),
                format!("{:02x}", u8::from(sig.typ())),
                ka.cert().fingerprint().to_hex(),
            ],
        );
    }

    fn error(&mut self, error: &VerificationError<'_>) {
        let (sig, rc) = match error {
            VerificationError::MissingKey { sig, .. } => (*sig, 9),
            VerificationError::BadSignature { ka, .. } => {
                let uid = ka.cert().primary_userid().map(|u| String::from_utf8_lossy(u.userid().value()).into_owned());
                self.status.insert("BADSIG", vec![ka.key().keyid().to_hex(), uid.unwrap_or_default()]);
                return;
            },
            VerificationError::MalformedSignature { sig, .. }
            | VerificationError::UnboundKey { sig, .. }
            | VerificationError::BadKey { sig, .. } => (*sig, 4),
        };
        let key_id = sig.get_issuers().first().map(KeyHandle::to_hex).unwrap_or_default();
        self.status.insert(
            "ERRSIG",
            vec![
                key_id,
                u8::from(sig.pk_algo()).to_string(),
                u8::from(sig.hash_algo()).to_string(),
                format!("{:02x}", u8::from(sig.typ())),
                creation_time(sig).to_string(),
                rc.to_string(),
            ],
        );
    }
}

fn creation_time(sig: &Signature) -> i64 {
    sig.signature_creation_time()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or_default()
}

impl VerificationHelper for StatusCollector<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.to_vec())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        // Never fail here: a bad or unverifiable signature is recorded and
        // judged by `signature_info`.
        for layer in structure {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    match result {
                        Ok(checksum) => self.good(&checksum),
                        Err(error) => self.error(&error),
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::cert::CertBuilder;
    use openpgp::serialize::stream::{Message, Signer};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use time::macros::datetime;

    const VALID: &str = "\
[GNUPG:] NEWSIG
[GNUPG:] KEY_CONSIDERED 0123456789ABCDEF0123456789ABCDEF01234567 0
[GNUPG:] SIG_ID abcdefghijk 2022-10-09 1665313500
[GNUPG:] GOODSIG 89ABCDEF01234567 Jane Doe <jane@example.org>
[GNUPG:] VALIDSIG 0123456789ABCDEF0123456789ABCDEF01234567 2022-10-09 1665313500 0 4 0 1 10 01 0123456789ABCDEF0123456789ABCDEF01234567
[GNUPG:] TRUST_UNDEFINED 0 pgp
";
    const UNCHECKED: &str = "\
[GNUPG:] NEWSIG
[GNUPG:] ERRSIG 89ABCDEF01234567 1 10 01 1665313500 9 -
[GNUPG:] NO_PUBKEY 89ABCDEF01234567
";

    #[test]
    fn test_parse_status() {
        let status = GpgStatus::parse(VALID);
        assert_eq!(status.get("GOODSIG").unwrap(), ["89ABCDEF01234567", "Jane Doe <jane@example.org>"]);
        assert_eq!(status.get("VALIDSIG").unwrap().len(), 10);
        assert_eq!(status.get("NEWSIG").unwrap().len(), 0);
        assert!(status.get("ERRSIG").is_none());
    }

    #[test]
    fn test_valid_signature() {
        let info = signature_info(&GpgStatus::parse(VALID)).unwrap();
        assert_eq!(info.key_id, "0123456789ABCDEF0123456789ABCDEF01234567");
        assert_eq!(info.date, datetime!(2022-10-09 11:05:00 UTC));
        assert!(info.date.offset().is_utc());
        assert_eq!(info.signer.email.as_deref(), Some("jane@example.org"));
    }

    #[test]
    fn test_unchecked_signature_fallback() {
        let info = signature_info(&GpgStatus::parse(UNCHECKED)).unwrap();
        assert_eq!(info.key_id, "89ABCDEF01234567");
        assert_eq!(info.date, datetime!(2022-10-09 11:05:00 UTC));
        assert!(info.signer.is_unknown());
    }

    #[test]
    fn test_valid_preferred_over_unchecked() {
        let status = GpgStatus::parse(&format!("{UNCHECKED}{VALID}"));
        let info = signature_info(&status).unwrap();
        assert_eq!(info.key_id, "0123456789ABCDEF0123456789ABCDEF01234567");
    }

    #[rstest]
    #[case("EXPKEYSIG", "Old Key <old@example.org>")]
    #[case("REVKEYSIG", "Revoked <rev@example.org>")]
    fn test_identity_keywords(#[case] keyword: &str, #[case] uid: &str) {
        let mut status = GpgStatus::default();
        status.insert("VALIDSIG", vec!["FPR".into(), "2022-10-09".into(), "1665313500".into()]);
        status.insert(keyword, vec!["KEYID".into(), uid.into()]);
        let info = signature_info(&status).unwrap();
        assert_eq!(info.signer.fullname.as_deref(), Some(uid));
    }

    #[test]
    fn test_valid_signature_without_identity() {
        let mut status = GpgStatus::default();
        status.insert("VALIDSIG", vec!["FPR".into(), "2022-10-09".into(), "1665313500".into()]);
        assert!(signature_info(&status).unwrap().signer.is_unknown());
    }

    #[rstest]
    #[case("")]
    #[case("[GNUPG:] NEWSIG\n[GNUPG:] BADSIG 89ABCDEF01234567 Jane Doe <jane@example.org>\n")]
    fn test_missing_signature(#[case] output: &str) {
        let err = signature_info(&GpgStatus::parse(output)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingSignature));
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut status = GpgStatus::default();
        status.insert("ERRSIG", vec!["KEYID".into(), "1".into()]);
        let err = signature_info(&status).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Verification(_)));
    }

    #[test]
    fn test_unsigned_message_yields_empty_status() {
        let verifier = KeyringVerifier::new(Vec::new());
        let status = verifier.verify(b"Source: hello\nVersion: 1.0-1\n").unwrap();
        assert!(status.is_empty());
    }

    fn signing_cert() -> Cert {
        let (cert, _) = CertBuilder::general_purpose(None, Some("Jane Doe <jane@example.org>")).generate().unwrap();
        cert
    }

    fn clearsign(cert: &Cert, text: &str) -> Vec<u8> {
        let policy = StandardPolicy::new();
        let keypair = cert
            .keys()
            .with_policy(&policy, None)
            .secret()
            .for_signing()
            .next()
            .unwrap()
            .key()
            .clone()
            .into_keypair()
            .unwrap();
        let mut out = Vec::new();
        let mut signer = Signer::new(Message::new(&mut out), keypair).cleartext().build().unwrap();
        signer.write_all(text.as_bytes()).unwrap();
        signer.finalize().unwrap();
        out
    }

    #[test]
    fn test_verify_known_key() {
        let cert = signing_cert();
        let message = clearsign(&cert, "Source: hello\nVersion: 1.0-1\n");
        let status = KeyringVerifier::new(vec![cert.clone()]).verify(&message).unwrap();
        assert!(status.get("GOODSIG").is_some());
        assert!(status.get("ERRSIG").is_none());

        let info = signature_info(&status).unwrap();
        assert_eq!(info.signer.name.as_deref(), Some("Jane Doe"));
        assert_eq!(info.signer.email.as_deref(), Some("jane@example.org"));
        assert!(cert.keys().any(|key| key.key().fingerprint().to_hex() == info.key_id));
        assert!(info.date.offset().is_utc());
    }

    #[test]
    fn test_verify_unknown_key() {
        let message = clearsign(&signing_cert(), "Source: hello\nVersion: 1.0-1\n");
        let status = KeyringVerifier::new(Vec::new()).verify(&message).unwrap();
        let errsig = status.get("ERRSIG").unwrap();
        assert_eq!(errsig.last().map(String::as_str), Some("9"));
        assert!(status.get("VALIDSIG").is_none());

        let info = signature_info(&status).unwrap();
        assert!(!info.key_id.is_empty());
        assert!(info.signer.is_unknown());
    }

    #[test]
    fn test_unreadable_keyrings_are_skipped() {
        let dir = TempDir::new().unwrap();
        let garbage = dir.path().join("garbage.gpg");
        fs::write(&garbage, b"definitely not a keyring").unwrap();
        let verifier = KeyringVerifier::from_keyrings(&[dir.path().join("missing.gpg"), garbage]);
        assert!(verifier.is_empty());
    }
}
