//! Camera thread and the live compositor that prints from it.

use async_trait::async_trait;
use snapbooth_core::{CaptureError, Compositor};
use snapbooth_hw::{compose_print, Camera, CameraError, Frame, PrintStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Give up on the device after this many dequeue failures in a row.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Latest frame from the camera thread, `None` until the first one lands.
pub type FrameFeed = watch::Receiver<Option<Arc<Frame>>>;

/// Open the camera and stream it on a dedicated OS thread.
///
/// Fails fast if the device cannot be opened. After that the thread keeps
/// publishing until every [`FrameFeed`] is dropped or the device dies.
pub fn spawn_camera(device: &str, width: u32, height: u32) -> Result<FrameFeed, CameraError> {
    let camera = Camera::open(device, width, height)?;
    let (tx, rx) = watch::channel(None);

    std::thread::Builder::new()
        .name("snapbooth-camera".into())
        .spawn(move || stream_frames(camera, tx))
        .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn camera thread: {e}")))?;

    Ok(rx)
}

fn stream_frames(camera: Camera, tx: watch::Sender<Option<Arc<Frame>>>) {
    tracing::info!(device = %camera.device_path, "camera thread started");
    let mut stream = match camera.stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "camera stream could not start");
            return;
        }
    };

    let mut failures = 0u32;
    loop {
        match stream.next_frame() {
            Ok(frame) => {
                failures = 0;
                if tx.send(Some(Arc::new(frame))).is_err() {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(error = %e, failures, "camera keeps failing; stopping stream");
                    break;
                }
                tracing::warn!(error = %e, failures, "frame dequeue failed");
                std::thread::sleep(RETRY_DELAY);
            }
        }
    }
    tracing::info!("camera thread exiting");
}

/// Prints the most recent camera frame.
pub struct LiveCompositor {
    feed: FrameFeed,
    max_age: Duration,
    style: PrintStyle,
}

impl LiveCompositor {
    pub fn new(feed: FrameFeed, max_age: Duration, style: PrintStyle) -> Self {
        Self {
            feed,
            max_age,
            style,
        }
    }

    fn latest(&self) -> Result<Arc<Frame>, CaptureError> {
        let latest = self.feed.borrow().clone();
        let frame = latest
            .ok_or_else(|| CaptureError::SourceUnavailable("no frame from camera yet".into()))?;

        let age = frame.timestamp.elapsed();
        if age > self.max_age {
            return Err(CaptureError::SourceUnavailable(format!(
                "latest frame is {} ms old",
                age.as_millis()
            )));
        }
        if frame.is_dark() {
            return Err(CaptureError::SourceUnavailable(
                "frame too dark (lens covered?)".into(),
            ));
        }
        Ok(frame)
    }
}

#[async_trait]
impl Compositor for LiveCompositor {
    async fn composite(&mut self) -> Result<Vec<u8>, CaptureError> {
        let frame = self.latest()?;
        tracing::debug!(sequence = frame.sequence, luma = frame.mean_luma(), "compositing frame");

        let style = self.style;
        tokio::task::spawn_blocking(move || compose_print(&frame, &style))
            .await
            .map_err(|e| CaptureError::CompositeFailed(format!("compose task failed: {e}")))?
            .map_err(|e| CaptureError::CompositeFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(value: u8, timestamp: Instant) -> Arc<Frame> {
        Arc::new(Frame {
            data: vec![value; 8 * 4 * 3],
            width: 8,
            height: 4,
            timestamp,
            sequence: 7,
        })
    }

    fn compositor(latest: Option<Arc<Frame>>) -> (watch::Sender<Option<Arc<Frame>>>, LiveCompositor) {
        let (tx, rx) = watch::channel(latest);
        let style = PrintStyle {
            border_px: 2,
            ..PrintStyle::default()
        };
        (tx, LiveCompositor::new(rx, Duration::from_secs(1), style))
    }

    #[tokio::test]
    async fn test_no_frame_is_source_unavailable() {
        let (_tx, mut c) = compositor(None);
        assert!(matches!(
            c.composite().await,
            Err(CaptureError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_frame_rejected() {
        let old = Instant::now().checked_sub(Duration::from_secs(5)).unwrap();
        let (_tx, mut c) = compositor(Some(frame(128, old)));
        let err = c.composite().await.unwrap_err();
        assert!(err.to_string().contains("old"), "{err}");
    }

    #[tokio::test]
    async fn test_dark_frame_rejected() {
        let (_tx, mut c) = compositor(Some(frame(0, Instant::now())));
        let err = c.composite().await.unwrap_err();
        assert!(err.to_string().contains("dark"), "{err}");
    }

    #[tokio::test]
    async fn test_prints_latest_frame() {
        let (tx, mut c) = compositor(None);
        tx.send(Some(frame(140, Instant::now()))).unwrap();

        let jpeg = c.composite().await.unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
