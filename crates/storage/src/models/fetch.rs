use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// Identifier of an origin (the place packages were fetched from).
pub type OriginId = u64;

/// Opaque handle returned when a fetch attempt is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchHandle(pub u64);
impl Display for FetchHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Pending,
    Success,
    Failure,
}

/// How an ingestion run ended for one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    /// The run failed; `detail` is the rendered error.
    Failure { detail: String },
}
impl FetchOutcome {
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::Success => FetchStatus::Success,
            Self::Failure { .. } => FetchStatus::Failure,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { detail } => Some(detail),
        }
    }
}

/// The log entry of one ingestion attempt against one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub handle: FetchHandle,
    pub origin: OriginId,
    pub started: OffsetDateTime,
    pub finished: Option<OffsetDateTime>,
    pub status: FetchStatus,
    pub detail: Option<String>,
}
impl FetchAttempt {
    pub fn open(handle: FetchHandle, origin: OriginId) -> Self {
        Self {
            handle,
            origin,
            started: OffsetDateTime::now_utc(),
            finished: None,
            status: FetchStatus::Pending,
            detail: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == FetchStatus::Pending
    }

    pub fn close(&mut self, outcome: &FetchOutcome) {
        self.finished = Some(OffsetDateTime::now_utc());
        self.status = outcome.status();
        self.detail = outcome.detail().map(str::to_string);
    }
}
