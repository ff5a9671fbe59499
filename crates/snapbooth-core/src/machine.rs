//! The booth orchestrator.
//!
//! One task owns the machine and pulls [`BoothEvent`]s from a single
//! channel, so transitions never interleave. Timers and uploads run as
//! their own tasks and report back through the same channel, tagged with
//! the session that started them; anything tagged with another session, or
//! arriving in a state that does not expect it, is dropped.

use crate::capture::{CaptureGate, Compositor};
use crate::config::{BoothConfig, ConfigError};
use crate::countdown::CountdownTimer;
use crate::display::BoothDisplay;
use crate::event::{self, BoothEvent, EventReceiver, EventSender};
use crate::presence::PresenceTracker;
use crate::result_display::{ResetCause, ResultDisplayTimer};
use crate::types::{
    BoothState, BoothStatus, CapturedImage, Notice, NoticeKind, RetrievalDescriptor, SessionId,
    UploadOutcome,
};
use crate::upload::{UploadError, UploadGate, UploadTransport};
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("booth machine has stopped")]
    Stopped,
}

/// Whether `from -> to` is an edge of the transition table. Every state
/// may also fall back to Idle on failure.
pub fn is_transition(from: BoothState, to: BoothState) -> bool {
    use BoothState::*;
    matches!(
        (from, to),
        (Idle, Counting)
            | (Counting, Idle)
            | (Counting, Capturing)
            | (Capturing, Uploading)
            | (Capturing, Idle)
            | (Uploading, ShowingResult)
            | (Uploading, Idle)
            | (ShowingResult, Idle)
    )
}

/// Clone-safe handle for feeding the machine and watching its status.
#[derive(Clone)]
pub struct BoothHandle {
    tx: EventSender,
    status: watch::Receiver<BoothStatus>,
}

impl BoothHandle {
    /// Push one per-frame observation from the perception loop.
    pub async fn observe(&self, face_found: bool) -> Result<(), MachineError> {
        self.send(BoothEvent::Observation(face_found)).await
    }

    /// Same as [`observe`](Self::observe), for producers on plain OS threads.
    pub fn blocking_observe(&self, face_found: bool) -> Result<(), MachineError> {
        self.tx
            .blocking_send(BoothEvent::Observation(face_found))
            .map_err(|_| MachineError::Stopped)
    }

    /// Ask to leave the result screen early.
    pub async fn take_another(&self) -> Result<(), MachineError> {
        self.send(BoothEvent::TakeAnother).await
    }

    pub async fn shutdown(&self) -> Result<(), MachineError> {
        self.send(BoothEvent::Shutdown).await
    }

    pub fn status(&self) -> BoothStatus {
        self.status.borrow().clone()
    }

    async fn send(&self, event: BoothEvent) -> Result<(), MachineError> {
        self.tx.send(event).await.map_err(|_| MachineError::Stopped)
    }
}

pub struct BoothMachine {
    config: BoothConfig,
    state: BoothState,
    session: SessionId,
    presence: PresenceTracker,
    countdown: CountdownTimer,
    capture: CaptureGate,
    upload: UploadGate,
    result: ResultDisplayTimer,
    display: Box<dyn BoothDisplay>,
    tx: EventSender,
    rx: EventReceiver,
    status: watch::Sender<BoothStatus>,
    descriptor: Option<RetrievalDescriptor>,
    last_error: Option<Notice>,
    since: DateTime<Utc>,
}

impl BoothMachine {
    pub fn new(
        config: BoothConfig,
        compositor: Box<dyn Compositor>,
        transport: Arc<dyn UploadTransport>,
        display: Box<dyn BoothDisplay>,
    ) -> Result<(Self, BoothHandle), ConfigError> {
        config.validate()?;

        let (tx, rx) = event::channel();
        let (status, status_rx) = watch::channel(BoothStatus::initial());
        let handle = BoothHandle {
            tx: tx.clone(),
            status: status_rx,
        };

        let machine = Self {
            presence: PresenceTracker::new(config.debounce_frames),
            countdown: CountdownTimer::new(),
            capture: CaptureGate::new(compositor, config.capture_timeout),
            upload: UploadGate::new(transport),
            result: ResultDisplayTimer::new(),
            config,
            state: BoothState::Idle,
            session: SessionId::default(),
            display,
            tx,
            rx,
            status,
            descriptor: None,
            last_error: None,
            since: Utc::now(),
        };
        Ok((machine, handle))
    }

    pub fn state(&self) -> BoothState {
        self.state
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn countdown(&self) -> &CountdownTimer {
        &self.countdown
    }

    pub fn result_window(&self) -> &ResultDisplayTimer {
        &self.result
    }

    /// Process events until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            countdown_secs = self.config.countdown_secs,
            result_secs = self.config.result_secs,
            debounce_frames = self.config.debounce_frames,
            "booth machine started"
        );
        while self.step().await.is_continue() {}
        tracing::info!("booth machine stopped");
    }

    /// Wait for the next event and handle it.
    pub async fn step(&mut self) -> ControlFlow<()> {
        match self.rx.recv().await {
            Some(event) => self.handle(event).await,
            None => ControlFlow::Break(()),
        }
    }

    /// Handle every event already queued without waiting for more.
    /// Returns how many were handled.
    pub async fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            handled += 1;
            if self.handle(event).await.is_break() {
                break;
            }
        }
        handled
    }

    pub async fn handle(&mut self, event: BoothEvent) -> ControlFlow<()> {
        match event {
            BoothEvent::Observation(found) => self.on_observation(found),
            BoothEvent::CountdownTick { session, remaining } => {
                if self.expects(BoothState::Counting, session) {
                    if self.countdown.record_tick(session, remaining).is_some() {
                        tracing::debug!(%session, remaining, "countdown tick");
                        self.display.countdown(remaining);
                        self.publish();
                    }
                } else {
                    self.discard("countdown tick", session);
                }
            }
            BoothEvent::CountdownFinished { session } => {
                if !self.expects(BoothState::Counting, session) {
                    self.discard("countdown finish", session);
                } else {
                    match self.countdown.complete(session) {
                        Ok(_) => self.capture_and_upload().await,
                        Err(e) => self.invariant_violation(e),
                    }
                }
            }
            BoothEvent::UploadFinished { session, outcome } => {
                if self.expects(BoothState::Uploading, session) && self.upload.finish(session) {
                    self.on_upload_outcome(outcome);
                } else {
                    self.discard("upload result", session);
                }
            }
            BoothEvent::ResultExpired { session } => {
                if !self.expects(BoothState::ShowingResult, session) {
                    self.discard("result expiry", session);
                } else if let Some((_, cause)) = self.result.expire(session) {
                    self.finish_result(cause);
                }
            }
            BoothEvent::TakeAnother => {
                if self.state != BoothState::ShowingResult {
                    tracing::debug!(state = %self.state, "take-another ignored");
                } else if let Some((_, cause)) = self.result.cancel_early() {
                    self.finish_result(cause);
                }
            }
            BoothEvent::Shutdown => {
                self.countdown.cancel();
                self.result.cancel_early();
                self.upload.abort();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_observation(&mut self, found: bool) {
        let Some(change) = self.presence.observe(found) else {
            return;
        };
        match (self.state, change.present) {
            (BoothState::Idle, true) => self.begin_countdown(),
            (BoothState::Counting, false) => {
                tracing::info!(session = %self.session, "subject left during countdown");
                self.enter_idle();
            }
            (state, present) => {
                tracing::debug!(%state, present, "presence change ignored");
            }
        }
    }

    fn begin_countdown(&mut self) {
        self.session = self.session.next();
        self.last_error = None;
        self.descriptor = None;
        match self
            .countdown
            .start(self.session, self.config.countdown_secs, self.tx.clone())
        {
            Ok(countdown) => {
                self.transition(BoothState::Counting);
                self.display.countdown(countdown.remaining_secs);
                self.publish();
            }
            Err(e) => self.invariant_violation(e),
        }
    }

    async fn capture_and_upload(&mut self) {
        self.transition(BoothState::Capturing);
        self.publish();

        match self.capture.capture(self.session).await {
            Ok(image) => self.begin_upload(image),
            Err(e) => {
                tracing::warn!(session = %self.session, error = %e, "capture failed");
                self.surface(NoticeKind::CaptureFailed, e.to_string());
                self.enter_idle();
            }
        }
    }

    fn begin_upload(&mut self, image: CapturedImage) {
        self.transition(BoothState::Uploading);
        match self.upload.begin(image, self.tx.clone()) {
            Ok(()) => self.publish(),
            Err(UploadError::Busy) => self.invariant_violation(UploadError::Busy),
            Err(e) => {
                self.surface(NoticeKind::UploadFailed, e.to_string());
                self.enter_idle();
            }
        }
    }

    fn on_upload_outcome(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Success(descriptor) => {
                match self.result.start(
                    self.session,
                    self.config.result_secs,
                    descriptor.clone(),
                    self.tx.clone(),
                ) {
                    Ok(_) => {
                        self.transition(BoothState::ShowingResult);
                        self.display.render(&descriptor);
                        self.descriptor = Some(descriptor);
                        self.publish();
                    }
                    Err(e) => self.invariant_violation(e),
                }
            }
            UploadOutcome::Failure(reason) => {
                self.surface(NoticeKind::UploadFailed, reason);
                self.enter_idle();
            }
        }
    }

    fn finish_result(&mut self, cause: ResetCause) {
        tracing::info!(session = %self.session, ?cause, "result window closed");
        self.display.clear_result();
        self.enter_idle();
    }

    /// Common Idle entry: no timer, upload or presence streak survives it.
    fn enter_idle(&mut self) {
        self.countdown.cancel();
        self.result.cancel_early();
        self.upload.abort();
        self.presence.reset();
        self.descriptor = None;
        self.transition(BoothState::Idle);
        self.display.idle();
        self.publish();
    }

    fn invariant_violation(&mut self, error: impl fmt::Display) {
        tracing::error!(session = %self.session, state = %self.state, error = %error, "booth invariant violated; resetting");
        self.surface(NoticeKind::Internal, error.to_string());
        self.enter_idle();
    }

    fn surface(&mut self, kind: NoticeKind, message: String) {
        let notice = Notice { kind, message };
        self.display.notify(&notice);
        self.last_error = Some(notice);
    }

    fn transition(&mut self, to: BoothState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug_assert!(is_transition(from, to), "illegal transition {from} -> {to}");
        tracing::info!(session = %self.session, %from, %to, "transition");
        self.state = to;
        self.since = Utc::now();
    }

    fn expects(&self, state: BoothState, session: SessionId) -> bool {
        self.state == state && self.session == session
    }

    fn discard(&self, what: &str, session: SessionId) {
        tracing::debug!(
            what,
            event_session = %session,
            session = %self.session,
            state = %self.state,
            "stale event discarded"
        );
    }

    fn publish(&self) {
        let remaining_secs = match self.state {
            BoothState::Counting => self.countdown.current().map(|c| c.remaining_secs),
            _ => None,
        };
        self.status.send_replace(BoothStatus {
            state: self.state,
            session: self.session,
            remaining_secs,
            descriptor: self.descriptor.clone(),
            last_error: self.last_error.clone(),
            since: self.since,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use async_trait::async_trait;

    struct NullCompositor;

    #[async_trait]
    impl Compositor for NullCompositor {
        async fn composite(&mut self) -> Result<Vec<u8>, CaptureError> {
            Ok(vec![0xFF, 0xD8])
        }
    }

    struct NullTransport;

    #[async_trait]
    impl UploadTransport for NullTransport {
        async fn send(&self, _image: &CapturedImage) -> Result<RetrievalDescriptor, UploadError> {
            Err(UploadError::Failed("offline".into()))
        }
    }

    struct NullDisplay;

    impl BoothDisplay for NullDisplay {
        fn render(&mut self, _descriptor: &RetrievalDescriptor) {}
        fn notify(&mut self, _notice: &Notice) {}
    }

    fn machine() -> (BoothMachine, BoothHandle) {
        BoothMachine::new(
            BoothConfig::default(),
            Box::new(NullCompositor),
            Arc::new(NullTransport),
            Box::new(NullDisplay),
        )
        .unwrap()
    }

    #[test]
    fn test_transition_table() {
        use BoothState::*;
        assert!(is_transition(Idle, Counting));
        assert!(is_transition(Counting, Capturing));
        assert!(is_transition(ShowingResult, Idle));
        assert!(!is_transition(Idle, Capturing));
        assert!(!is_transition(Counting, Uploading));
        assert!(!is_transition(Uploading, Counting));
        assert!(!is_transition(ShowingResult, Counting));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BoothConfig {
            result_secs: 0,
            ..BoothConfig::default()
        };
        let result = BoothMachine::new(
            config,
            Box::new(NullCompositor),
            Arc::new(NullTransport),
            Box::new(NullDisplay),
        );
        assert!(matches!(result, Err(ConfigError::NotPositive("result_secs"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_in_idle_are_noops() {
        let (mut m, _handle) = machine();
        for event in [
            BoothEvent::CountdownTick { session: SessionId(0), remaining: 2 },
            BoothEvent::CountdownFinished { session: SessionId(0) },
            BoothEvent::UploadFinished {
                session: SessionId(0),
                outcome: UploadOutcome::Failure("late".into()),
            },
            BoothEvent::ResultExpired { session: SessionId(0) },
            BoothEvent::TakeAnother,
            BoothEvent::Observation(false),
        ] {
            assert!(m.handle(event).await.is_continue());
            assert_eq!(m.state(), BoothState::Idle);
        }
        assert!(m.presence().streak() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_bumps_on_each_countdown() {
        let (mut m, _handle) = machine();
        for expected in 1..=3 {
            for _ in 0..3 {
                m.handle(BoothEvent::Observation(true)).await;
            }
            assert_eq!(m.state(), BoothState::Counting);
            assert_eq!(m.session(), SessionId(expected));
            m.handle(BoothEvent::Observation(false)).await;
            assert_eq!(m.state(), BoothState::Idle);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_breaks_and_cancels() {
        let (mut m, _handle) = machine();
        for _ in 0..3 {
            m.handle(BoothEvent::Observation(true)).await;
        }
        assert!(m.countdown().is_active());
        assert!(m.handle(BoothEvent::Shutdown).await.is_break());
        assert!(!m.countdown().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_publishes_status() {
        let (mut m, handle) = machine();
        for _ in 0..3 {
            m.handle(BoothEvent::Observation(true)).await;
        }
        let status = handle.status();
        assert_eq!(status.state, BoothState::Counting);
        assert_eq!(status.session, SessionId(1));
        assert_eq!(status.remaining_secs, Some(5));
    }
}
