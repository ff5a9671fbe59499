//! One-upload-at-a-time guard around the upload transport.
//!
//! The transport owns retry and backoff; the gate only ever sees the
//! terminal result and reduces it to an [`UploadOutcome`].

use crate::event::{BoothEvent, EventSender};
use crate::types::{CapturedImage, RetrievalDescriptor, SessionId, UploadOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("an upload is already in flight")]
    Busy,
    #[error("{0}")]
    InvalidImage(String),
    #[error("image size {size} bytes exceeds limit of {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },
    #[error("{0}")]
    Failed(String),
}

/// Sends an encoded image somewhere and returns how to retrieve it.
/// Implementations retry internally; an `Err` is final.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(&self, image: &CapturedImage) -> Result<RetrievalDescriptor, UploadError>;
}

struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct InFlight {
    session: SessionId,
    task: JoinHandle<()>,
}

pub struct UploadGate {
    transport: Arc<dyn UploadTransport>,
    busy: Arc<AtomicBool>,
    in_flight: Option<InFlight>,
}

impl UploadGate {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            transport,
            busy: Arc::new(AtomicBool::new(false)),
            in_flight: None,
        }
    }

    /// Upload and wait for the terminal outcome.
    pub async fn upload(&self, image: &CapturedImage) -> Result<UploadOutcome, UploadError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(UploadError::Busy)?;
        Ok(send(self.transport.as_ref(), image).await)
    }

    /// Start an upload in the background. The outcome arrives as
    /// [`BoothEvent::UploadFinished`] tagged with the image's session.
    pub fn begin(&mut self, image: CapturedImage, events: EventSender) -> Result<(), UploadError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(UploadError::Busy)?;
        let session = image.session();
        let transport = self.transport.clone();

        let task = tokio::spawn(async move {
            let outcome = {
                let _guard = guard;
                send(transport.as_ref(), &image).await
            };
            let _ = events.send(BoothEvent::UploadFinished { session, outcome }).await;
        });
        self.in_flight = Some(InFlight { session, task });
        tracing::debug!(%session, "upload started");
        Ok(())
    }

    /// Acknowledge the outcome for `session`. Returns false if no upload
    /// for that session was in flight.
    pub fn finish(&mut self, session: SessionId) -> bool {
        match &self.in_flight {
            Some(f) if f.session == session => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the in-flight upload, if any. Its outcome is never delivered.
    pub fn abort(&mut self) -> Option<SessionId> {
        let in_flight = self.in_flight.take()?;
        in_flight.task.abort();
        Some(in_flight.session)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for UploadGate {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn send(transport: &dyn UploadTransport, image: &CapturedImage) -> UploadOutcome {
    match transport.send(image).await {
        Ok(descriptor) => {
            tracing::info!(session = %image.session(), key = %descriptor.key, "upload succeeded");
            UploadOutcome::Success(descriptor)
        }
        Err(e) => {
            tracing::warn!(session = %image.session(), error = %e, "upload failed");
            UploadOutcome::Failure(e.to_string())
        }
    }
}
