//! Messages delivered to the machine's single dispatch point.

use crate::types::{SessionId, UploadOutcome};
use tokio::sync::mpsc;

/// Everything the machine reacts to. Timer and upload events carry the
/// session they were started for so late deliveries can be discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum BoothEvent {
    /// One per-frame "face observed" sample from the perception loop.
    Observation(bool),
    CountdownTick { session: SessionId, remaining: u32 },
    CountdownFinished { session: SessionId },
    UploadFinished { session: SessionId, outcome: UploadOutcome },
    ResultExpired { session: SessionId },
    /// User asked to start over while a result is on screen.
    TakeAnother,
    Shutdown,
}

impl BoothEvent {
    /// Session tag for events emitted by timers and uploads.
    pub fn session(&self) -> Option<SessionId> {
        match self {
            BoothEvent::CountdownTick { session, .. }
            | BoothEvent::CountdownFinished { session }
            | BoothEvent::UploadFinished { session, .. }
            | BoothEvent::ResultExpired { session } => Some(*session),
            _ => None,
        }
    }
}

pub type EventSender = mpsc::Sender<BoothEvent>;
pub type EventReceiver = mpsc::Receiver<BoothEvent>;

/// Channel depth for the machine's event queue.
pub const EVENT_QUEUE_DEPTH: usize = 64;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_QUEUE_DEPTH)
}
