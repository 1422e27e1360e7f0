use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::{convert::Infallible, str::FromStr};

/// A person credited on a revision or release.
///
/// Parsed from RFC 822 style identities (`Jane Doe <jane@example.org>`) as
/// they appear in changelog trailers and OpenPGP user ids. An unknown
/// identity (an unsigned fallback, for example) is the [`Default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub name: Option<String>,
    pub email: Option<String>,
    /// The identity exactly as it was written.
    pub fullname: Option<String>,
}
impl Person {
    pub fn new(name: Option<impl Into<String>>, email: Option<impl Into<String>>) -> Self {
        let name = name.map(Into::into).filter(|n: &String| !n.is_empty());
        let email = email.map(Into::into).filter(|e: &String| !e.is_empty());
        let fullname = match (&name, &email) {
            (Some(n), Some(e)) => Some(format!("{n} <{e}>")),
            (Some(n), None) => Some(n.clone()),
            (None, Some(e)) => Some(format!("<{e}>")),
            (None, None) => None,
        };
        Self { name, email, fullname }
    }

    pub fn is_unknown(&self) -> bool {
        self.fullname.is_none()
    }
}

impl FromStr for Person {
    type Err = Infallible;
    fn from_str(uid: &str) -> Result<Self, Self::Err> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Ok(Self::default());
        }
        let (name, email) = match (uid.rfind('<'), uid.ends_with('>')) {
            (Some(open), true) => {
                let name = uid[..open].trim().trim_matches('"').trim();
                let email = uid[open + 1..uid.len() - 1].trim();
                (Some(name), Some(email))
            },
            _ if !uid.contains(char::is_whitespace) && uid.contains('@') => (None, Some(uid)),
            _ => (Some(uid), None),
        };
        Ok(Self {
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            email: email.filter(|e| !e.is_empty()).map(str::to_string),
            fullname: Some(uid.to_string()),
        })
    }
}

impl Display for Person {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.fullname {
            Some(fullname) => f.write_str(fullname),
            None => f.write_str("(unknown)"),
        }
    }
}
