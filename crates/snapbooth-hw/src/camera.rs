//! Booth camera over V4L2 (`v4l` crate), delivering packed RGB frames.

use crate::frame::{self, Frame};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("camera is in use by another process")]
    DeviceBusy,
    #[error("{0} is not a video capture device")]
    StreamingNotSupported(String),
    #[error("could not agree on a frame format: {0}")]
    FormatNegotiationFailed(String),
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
}

/// A V4L2 capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Frame layouts the camera can hand us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 4:2:2, converted on capture. Preferred: nearly every webcam has it.
    Yuyv,
    /// Packed RGB24, copied through.
    Rgb3,
}

impl PixelFormat {
    const PREFERENCE: [PixelFormat; 2] = [PixelFormat::Yuyv, PixelFormat::Rgb3];

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Rgb3 => FourCC::new(b"RGB3"),
        }
    }

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|f| f.fourcc() == fourcc)
    }
}

pub struct Camera {
    device: Device,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and ask for `width`x`height`. Drivers may pick a
    /// nearby size; the one they settle on is what frames will have.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }
        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("querying capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported(device_path.to_string()));
        }

        let (pixel_format, width, height) = negotiate(&device, width, height)?;
        tracing::info!(
            device = device_path,
            card = %caps.card,
            width,
            height,
            format = ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width,
            height,
            pixel_format,
        })
    }

    /// Start streaming. Frames are pulled with [`FrameStream::next_frame`].
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let inner = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("mapping stream buffers: {e}")))?;
        Ok(FrameStream {
            camera: self,
            inner,
        })
    }

    /// One frame, after dropping `warmup` frames so exposure can settle.
    pub fn capture_frame(&self, warmup: usize) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        for _ in 0..warmup {
            stream.next_frame()?;
        }
        stream.next_frame()
    }

    fn to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(e.to_string())),
            PixelFormat::Rgb3 => {
                let len = (self.width * self.height * 3) as usize;
                buf.get(..len).map(<[u8]>::to_vec).ok_or_else(|| {
                    CameraError::CaptureFailed(format!("short RGB3 buffer ({} of {len} bytes)", buf.len()))
                })
            }
        }
    }

    /// Every `/dev/video*` node that can capture, sorted by path.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };
        let mut paths: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with("video"))
            .map(|name| format!("/dev/{name}"))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                        path,
                    })
            })
            .collect()
    }
}

fn open_error(path: &str, e: std::io::Error) -> CameraError {
    if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{path}: {e}"))
    }
}

/// Try each supported format in preference order; the first one the driver
/// keeps wins.
fn negotiate(device: &Device, width: u32, height: u32) -> Result<(PixelFormat, u32, u32), CameraError> {
    let mut requested = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("reading current format: {e}")))?;
    requested.width = width;
    requested.height = height;

    let mut offered = Vec::new();
    for wanted in PixelFormat::PREFERENCE {
        requested.fourcc = wanted.fourcc();
        let granted = device
            .set_format(&requested)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("setting {wanted:?}: {e}")))?;
        if let Some(format) = PixelFormat::from_fourcc(granted.fourcc) {
            return Ok((format, granted.width, granted.height));
        }
        offered.push(granted.fourcc);
    }
    Err(CameraError::FormatNegotiationFailed(format!(
        "driver only offers {offered:?}, need YUYV or RGB3"
    )))
}

/// A running capture stream borrowed from its [`Camera`].
pub struct FrameStream<'a> {
    camera: &'a Camera,
    inner: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Block until the next buffer is dequeued, converted to RGB.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .inner
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;
        let sequence = meta.sequence;
        let data = self.camera.to_rgb(buf)?;

        Ok(Frame {
            data,
            width: self.camera.width,
            height: self.camera.height,
            timestamp: Instant::now(),
            sequence,
        })
    }
}
