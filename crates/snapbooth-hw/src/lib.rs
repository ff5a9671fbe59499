//! snapbooth-hw: hardware abstraction for the booth camera.
//!
//! Provides V4L2 colour capture and the compositing step that turns a
//! live frame into an encoded print.

pub mod camera;
pub mod compose;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use compose::{compose_print, ComposeError, PrintStyle};
pub use frame::Frame;
