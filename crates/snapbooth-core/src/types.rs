use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The booth's current phase. Exactly one is current at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoothState {
    Idle,
    Counting,
    Capturing,
    Uploading,
    ShowingResult,
}

impl BoothState {
    /// Whether presence changes drive transitions out of this state.
    pub fn follows_presence(self) -> bool {
        matches!(self, BoothState::Idle | BoothState::Counting)
    }
}

impl fmt::Display for BoothState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoothState::Idle => "idle",
            BoothState::Counting => "counting",
            BoothState::Capturing => "capturing",
            BoothState::Uploading => "uploading",
            BoothState::ShowingResult => "showing_result",
        };
        f.write_str(name)
    }
}

/// Identifies one Idle → ... → Idle cycle. Strictly increasing for the
/// lifetime of a machine; events tagged with an older value are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded image produced once per capture. Cheap to clone, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Arc<[u8]>,
    session: SessionId,
}

impl CapturedImage {
    pub fn new(session: SessionId, bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
            session,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Session that produced this image.
    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("session", &self.session)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the user exchanges for the finished photo: the stored object key
/// and a download link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalDescriptor {
    pub key: String,
    pub url: String,
}

/// Terminal result of one upload attempt-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success(RetrievalDescriptor),
    Failure(String),
}

/// A user-visible failure notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    CaptureFailed,
    UploadFailed,
    /// Invariant violation inside the machine (two timers, two uploads).
    Internal,
}

/// Externally observable snapshot of the machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoothStatus {
    pub state: BoothState,
    pub session: SessionId,
    /// Seconds left on the countdown, only while counting.
    pub remaining_secs: Option<u32>,
    pub descriptor: Option<RetrievalDescriptor>,
    pub last_error: Option<Notice>,
    pub since: DateTime<Utc>,
}

impl BoothStatus {
    pub fn initial() -> Self {
        Self {
            state: BoothState::Idle,
            session: SessionId::default(),
            remaining_secs: None,
            descriptor: None,
            last_error: None,
            since: Utc::now(),
        }
    }
}
