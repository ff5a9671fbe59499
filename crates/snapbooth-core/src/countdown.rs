//! Cancellable one-second countdown.

use crate::event::{BoothEvent, EventSender};
use crate::types::SessionId;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer already running for session {0}")]
    AlreadyRunning(SessionId),
    #[error("timer duration must be at least one second")]
    ZeroDuration,
    #[error("no timer running")]
    NotRunning,
    #[error("stale timer event: running {running}, got {got}")]
    Stale { running: SessionId, got: SessionId },
}

/// Value view of the live countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownSession {
    pub session: SessionId,
    pub total_secs: u32,
    pub remaining_secs: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Completed,
    Cancelled,
}

/// How a countdown ended, with its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownEnd {
    pub countdown: CountdownSession,
    pub outcome: CountdownOutcome,
}

struct Running {
    countdown: CountdownSession,
    task: JoinHandle<()>,
}

/// Holds at most one ticking countdown. Ticks and completion are delivered
/// as [`BoothEvent`]s on the sender given to [`start`](Self::start).
#[derive(Default)]
pub struct CountdownTimer {
    running: Option<Running>,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking. Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        session: SessionId,
        total_secs: u32,
        events: EventSender,
    ) -> Result<CountdownSession, TimerError> {
        if let Some(running) = &self.running {
            return Err(TimerError::AlreadyRunning(running.countdown.session));
        }
        if total_secs == 0 {
            return Err(TimerError::ZeroDuration);
        }

        let countdown = CountdownSession {
            session,
            total_secs,
            remaining_secs: total_secs,
            active: true,
        };
        let task = tokio::spawn(tick(session, total_secs, events));
        self.running = Some(Running { countdown, task });
        tracing::debug!(%session, total_secs, "countdown started");
        Ok(countdown)
    }

    /// Apply a tick event. Returns the updated view, or `None` for ticks
    /// that do not belong to the running countdown.
    pub fn record_tick(&mut self, session: SessionId, remaining: u32) -> Option<CountdownSession> {
        let running = self.running.as_mut()?;
        if running.countdown.session != session {
            return None;
        }
        running.countdown.remaining_secs = remaining;
        Some(running.countdown)
    }

    /// Accept the natural end of the running countdown.
    pub fn complete(&mut self, session: SessionId) -> Result<CountdownEnd, TimerError> {
        let running = self.running.as_ref().ok_or(TimerError::NotRunning)?;
        if running.countdown.session != session {
            return Err(TimerError::Stale {
                running: running.countdown.session,
                got: session,
            });
        }
        let Some(running) = self.running.take() else {
            return Err(TimerError::NotRunning);
        };
        let mut countdown = running.countdown;
        countdown.remaining_secs = 0;
        countdown.active = false;
        Ok(CountdownEnd {
            countdown,
            outcome: CountdownOutcome::Completed,
        })
    }

    /// Stop ticking immediately. No tick or completion for this countdown
    /// is sent after this returns.
    pub fn cancel(&mut self) -> Option<CountdownEnd> {
        let running = self.running.take()?;
        running.task.abort();
        let mut countdown = running.countdown;
        countdown.active = false;
        tracing::debug!(session = %countdown.session, remaining = countdown.remaining_secs, "countdown cancelled");
        Some(CountdownEnd {
            countdown,
            outcome: CountdownOutcome::Cancelled,
        })
    }

    pub fn current(&self) -> Option<CountdownSession> {
        self.running.as_ref().map(|r| r.countdown)
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

async fn tick(session: SessionId, total_secs: u32, events: EventSender) {
    let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for remaining in (0..total_secs).rev() {
        interval.tick().await;
        let event = if remaining == 0 {
            BoothEvent::CountdownFinished { session }
        } else {
            BoothEvent::CountdownTick { session, remaining }
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}
