//! Face detector capability interface.
//!
//! Any backend that turns some input (a camera frame, a line of output
//! from an external detector process) into face detections can drive the
//! booth. The backend is chosen at construction time; the machine only
//! ever sees the per-frame boolean produced by [`PresenceProbe`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector input malformed: {0}")]
    MalformedInput(String),
    #[error("detector unavailable: {0}")]
    Unavailable(String),
}

/// One detected face in input pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    pub confidence: f32,
}

pub trait FaceDetector {
    type Input: ?Sized;

    /// Detect faces, in any order.
    fn detect(&mut self, input: &Self::Input) -> Result<Vec<Detection>, DetectorError>;
}

/// Backend-independent knobs applied to raw detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSettings {
    pub min_confidence: f32,
    /// Faces narrower than this (pixels) are ignored; 0 accepts any size.
    pub min_face_width: f32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_face_width: 0.0,
        }
    }
}

/// Reduces a detector's output to the per-frame "face observed" sample.
pub struct PresenceProbe<D> {
    detector: D,
    settings: ProbeSettings,
}

impl<D: FaceDetector> PresenceProbe<D> {
    pub fn new(detector: D, settings: ProbeSettings) -> Self {
        Self { detector, settings }
    }

    /// `Some(found)` per input. A detector failure is `None`: no sample,
    /// which is different from a sample saying nobody is there.
    pub fn observe(&mut self, input: &D::Input) -> Option<bool> {
        match self.detector.detect(input) {
            Ok(faces) => Some(faces.iter().any(|f| self.accepts(f))),
            Err(e) => {
                tracing::debug!(error = %e, "detector produced no sample");
                None
            }
        }
    }

    pub fn settings(&self) -> ProbeSettings {
        self.settings
    }

    fn accepts(&self, face: &Detection) -> bool {
        face.confidence >= self.settings.min_confidence && face.width >= self.settings.min_face_width
    }
}
