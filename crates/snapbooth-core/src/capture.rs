//! Single-shot capture: hand the live frame to the compositor, once.

use crate::types::{CapturedImage, SessionId};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("compositing failed: {0}")]
    CompositeFailed(String),
    #[error("compositor produced an empty image")]
    EmptyImage,
    #[error("capture timed out after {0:?}")]
    TimedOut(Duration),
    #[error("session {0} was already captured")]
    AlreadyCaptured(SessionId),
}

/// Produces an encoded image from whatever live video source it holds.
#[async_trait]
pub trait Compositor: Send {
    async fn composite(&mut self) -> Result<Vec<u8>, CaptureError>;
}

pub struct CaptureGate {
    compositor: Box<dyn Compositor>,
    timeout: Duration,
    last_session: Option<SessionId>,
}

impl CaptureGate {
    pub fn new(compositor: Box<dyn Compositor>, timeout: Duration) -> Self {
        Self {
            compositor,
            timeout,
            last_session: None,
        }
    }

    /// Capture the image for `session`. A second call for the same session
    /// fails without touching the compositor.
    pub async fn capture(&mut self, session: SessionId) -> Result<CapturedImage, CaptureError> {
        if self.last_session.is_some_and(|last| last >= session) {
            return Err(CaptureError::AlreadyCaptured(session));
        }
        self.last_session = Some(session);

        let limit = self.timeout;
        let bytes = tokio::time::timeout(limit, self.compositor.composite())
            .await
            .map_err(|_| CaptureError::TimedOut(limit))??;

        if bytes.is_empty() {
            return Err(CaptureError::EmptyImage);
        }
        tracing::debug!(%session, bytes = bytes.len(), "captured image");
        Ok(CapturedImage::new(session, bytes))
    }
}
