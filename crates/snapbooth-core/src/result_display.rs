//! Timed result window: show the retrieval code, then reset.

use crate::countdown::TimerError;
use crate::event::{BoothEvent, EventSender};
use crate::types::{RetrievalDescriptor, SessionId};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWindow {
    pub session: SessionId,
    pub total_secs: u32,
    pub active: bool,
    pub descriptor: RetrievalDescriptor,
}

/// Why a result window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    Expired,
    EarlyCancel,
}

struct Open {
    window: ResultWindow,
    task: JoinHandle<()>,
}

/// Holds at most one open result window. Exactly one reset is reported per
/// window: whichever of [`expire`](Self::expire) and
/// [`cancel_early`](Self::cancel_early) arrives first closes it.
#[derive(Default)]
pub struct ResultDisplayTimer {
    open: Option<Open>,
}

impl ResultDisplayTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        session: SessionId,
        total_secs: u32,
        descriptor: RetrievalDescriptor,
        events: EventSender,
    ) -> Result<ResultWindow, TimerError> {
        if let Some(open) = &self.open {
            return Err(TimerError::AlreadyRunning(open.window.session));
        }
        if total_secs == 0 {
            return Err(TimerError::ZeroDuration);
        }

        let window = ResultWindow {
            session,
            total_secs,
            active: true,
            descriptor,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(total_secs))).await;
            let _ = events.send(BoothEvent::ResultExpired { session }).await;
        });
        self.open = Some(Open {
            window: window.clone(),
            task,
        });
        tracing::debug!(%session, total_secs, "result window opened");
        Ok(window)
    }

    /// Natural expiry. `None` if the window for `session` is no longer open.
    pub fn expire(&mut self, session: SessionId) -> Option<(ResultWindow, ResetCause)> {
        if self.open.as_ref()?.window.session != session {
            return None;
        }
        let open = self.open.take()?;
        Some(Self::close(open, ResetCause::Expired))
    }

    /// User asked to take another photo. `None` if no window is open.
    pub fn cancel_early(&mut self) -> Option<(ResultWindow, ResetCause)> {
        let open = self.open.take()?;
        open.task.abort();
        Some(Self::close(open, ResetCause::EarlyCancel))
    }

    pub fn current(&self) -> Option<&ResultWindow> {
        self.open.as_ref().map(|o| &o.window)
    }

    pub fn is_active(&self) -> bool {
        self.open.is_some()
    }

    fn close(open: Open, cause: ResetCause) -> (ResultWindow, ResetCause) {
        let mut window = open.window;
        window.active = false;
        tracing::debug!(session = %window.session, ?cause, "result window closed");
        (window, cause)
    }
}

impl Drop for ResultDisplayTimer {
    fn drop(&mut self) {
        if let Some(open) = self.open.take() {
            open.task.abort();
        }
    }
}
