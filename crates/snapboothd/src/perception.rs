//! Perception loop fed by an external detector process.
//!
//! The detector writes one JSON document per analysed frame: either a bare
//! array of detections or `{"faces": [...]}`. A line that does not parse
//! produces no sample at all.

use serde::Deserialize;
use snapbooth_core::{BoothHandle, Detection, DetectorError, FaceDetector, PresenceProbe};
use std::io::BufRead;

#[derive(Deserialize)]
#[serde(untagged)]
enum Report {
    Bare(Vec<Detection>),
    Wrapped { faces: Vec<Detection> },
}

/// Detector backend that parses JSON-lines detector output.
#[derive(Debug, Default)]
pub struct JsonLineDetector;

impl FaceDetector for JsonLineDetector {
    type Input = str;

    fn detect(&mut self, line: &str) -> Result<Vec<Detection>, DetectorError> {
        let report: Report = serde_json::from_str(line.trim())
            .map_err(|e| DetectorError::MalformedInput(e.to_string()))?;
        Ok(match report {
            Report::Bare(faces) | Report::Wrapped { faces } => faces,
        })
    }
}

/// Read stdin on a dedicated OS thread. A blocked read never holds up
/// shutdown: the thread is simply left behind when the process exits.
pub fn spawn_stdin(
    probe: PresenceProbe<JsonLineDetector>,
    booth: BoothHandle,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("snapbooth-perception".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            if let Err(e) = run(stdin.lock(), probe, booth) {
                tracing::error!(error = %e, "perception input failed");
            }
        })?;
    Ok(())
}

/// Feed samples from `input` into the booth until the input ends or the
/// machine stops. Returns the number of samples delivered. Blocks; call it
/// from a plain OS thread.
pub fn run<R: BufRead>(
    input: R,
    mut probe: PresenceProbe<JsonLineDetector>,
    booth: BoothHandle,
) -> std::io::Result<u64> {
    let settings = probe.settings();
    tracing::info!(
        min_confidence = settings.min_confidence,
        min_face_width = settings.min_face_width,
        "perception loop started"
    );

    let mut samples = 0u64;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(found) = probe.observe(line.as_str()) else {
            continue;
        };
        if booth.blocking_observe(found).is_err() {
            tracing::debug!("booth stopped; perception loop exiting");
            break;
        }
        samples += 1;
    }

    tracing::info!(samples, "perception input closed");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snapbooth_core::{
        BoothConfig, BoothDisplay, BoothMachine, BoothState, CaptureError, CapturedImage,
        Compositor, Notice, ProbeSettings, RetrievalDescriptor, UploadError, UploadTransport,
    };
    use std::sync::Arc;

    struct NoCamera;

    #[async_trait]
    impl Compositor for NoCamera {
        async fn composite(&mut self) -> Result<Vec<u8>, CaptureError> {
            Err(CaptureError::SourceUnavailable("test".into()))
        }
    }

    struct NoUpload;

    #[async_trait]
    impl UploadTransport for NoUpload {
        async fn send(&self, _image: &CapturedImage) -> Result<RetrievalDescriptor, UploadError> {
            Err(UploadError::Failed("test".into()))
        }
    }

    struct Blank;

    impl BoothDisplay for Blank {
        fn render(&mut self, _descriptor: &RetrievalDescriptor) {}
        fn notify(&mut self, _notice: &Notice) {}
    }

    fn machine() -> (BoothMachine, BoothHandle) {
        BoothMachine::new(
            BoothConfig::default(),
            Box::new(NoCamera),
            Arc::new(NoUpload),
            Box::new(Blank),
        )
        .unwrap()
    }

    fn probe() -> PresenceProbe<JsonLineDetector> {
        PresenceProbe::new(JsonLineDetector, ProbeSettings::default())
    }

    /// Run the blocking loop off the runtime, the way the daemon does.
    fn run_on_thread(input: &'static [u8], booth: BoothHandle) -> u64 {
        std::thread::spawn(move || run(input, probe(), booth))
            .join()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_parses_both_shapes() {
        let mut d = JsonLineDetector;
        let bare = d.detect(r#"[{"confidence": 0.9, "width": 80}]"#).unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].width, 80.0);

        let wrapped = d.detect(r#"{"faces": []}"#).unwrap();
        assert!(wrapped.is_empty());
    }

    #[test]
    fn test_garbage_line_is_malformed() {
        let mut d = JsonLineDetector;
        assert!(matches!(
            d.detect("frame 12: face"),
            Err(DetectorError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_low_confidence_is_absence() {
        let mut p = probe();
        assert_eq!(p.observe(r#"[{"confidence": 0.2}]"#), Some(false));
        assert_eq!(p.observe(r#"[{"confidence": 0.8}]"#), Some(true));
        assert_eq!(p.observe("not json"), None);
    }

    #[tokio::test]
    async fn test_lines_drive_countdown() {
        let (mut machine, handle) = machine();
        let input: &'static [u8] = b"[{\"confidence\":0.9}]\n\
            garbage\n\
            \n\
            {\"faces\":[{\"confidence\":0.95}]}\n\
            [{\"confidence\":0.7}]\n";

        assert_eq!(run_on_thread(input, handle), 3);

        assert_eq!(machine.dispatch_pending().await, 3);
        assert_eq!(machine.state(), BoothState::Counting);
    }

    #[test]
    fn test_stops_when_booth_gone() {
        let (machine, handle) = machine();
        drop(machine);

        assert_eq!(run_on_thread(b"[]\n[]\n", handle), 0);
    }

    #[test]
    fn test_read_error_is_reported() {
        struct Broken;

        impl std::io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("pipe gone"))
            }
        }

        let (_machine, handle) = machine();
        let err = run(std::io::BufReader::new(Broken), probe(), handle).unwrap_err();
        assert_eq!(err.to_string(), "pipe gone");
    }
}
