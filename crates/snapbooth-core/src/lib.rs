//! snapbooth-core: presence-driven photo booth orchestration.
//!
//! A debounced presence signal starts a countdown; the countdown's natural
//! end triggers one capture, the image is uploaded, and the retrieval code
//! is shown for a fixed window before the booth resets itself. Camera,
//! compositor, upload transport and renderer are supplied by the host
//! through the traits re-exported here.

pub mod capture;
pub mod config;
pub mod countdown;
pub mod detector;
pub mod display;
pub mod event;
pub mod machine;
pub mod presence;
pub mod result_display;
pub mod types;
pub mod upload;

pub use capture::{CaptureError, CaptureGate, Compositor};
pub use config::{BoothConfig, ConfigError};
pub use countdown::{CountdownOutcome, CountdownSession, CountdownTimer, TimerError};
pub use detector::{Detection, DetectorError, FaceDetector, PresenceProbe, ProbeSettings};
pub use display::BoothDisplay;
pub use event::BoothEvent;
pub use machine::{BoothHandle, BoothMachine, MachineError};
pub use presence::{PresenceChange, PresenceSignal, PresenceTracker};
pub use result_display::{ResetCause, ResultDisplayTimer, ResultWindow};
pub use types::{
    BoothState, BoothStatus, CapturedImage, Notice, NoticeKind, RetrievalDescriptor, SessionId,
    UploadOutcome,
};
pub use upload::{UploadError, UploadGate, UploadTransport};
