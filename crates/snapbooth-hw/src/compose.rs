//! Print compositing: mirror the live frame, mat it in a border, encode JPEG.

use crate::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use thiserror::Error;

const MAT_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("frame data does not match {width}x{height} RGB ({actual} bytes)")]
    InvalidFrame { width: u32, height: u32, actual: usize },
    #[error("{width}x{height} frame with a {border_px}px border is too large to print")]
    TooLarge { width: u32, height: u32, border_px: u32 },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintStyle {
    /// Flip horizontally so the print matches what the subject saw.
    pub mirror: bool,
    pub border_px: u32,
    pub jpeg_quality: u8,
}

impl Default for PrintStyle {
    fn default() -> Self {
        Self {
            mirror: true,
            border_px: 48,
            jpeg_quality: 90,
        }
    }
}

/// Lay out the print without encoding it.
pub fn layout(frame: &Frame, style: &PrintStyle) -> Result<RgbImage, ComposeError> {
    let photo = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
        ComposeError::InvalidFrame {
            width: frame.width,
            height: frame.height,
            actual: frame.data.len(),
        },
    )?;
    let photo = if style.mirror {
        imageops::flip_horizontal(&photo)
    } else {
        photo
    };

    let b = style.border_px;
    let padded = |side: u32| b.checked_mul(2).and_then(|pad| side.checked_add(pad));
    let (Some(width), Some(height)) = (padded(frame.width), padded(frame.height)) else {
        return Err(ComposeError::TooLarge {
            width: frame.width,
            height: frame.height,
            border_px: b,
        });
    };
    let mut print = RgbImage::from_pixel(width, height, MAT_COLOUR);
    imageops::replace(&mut print, &photo, i64::from(b), i64::from(b));
    Ok(print)
}

/// Compose the print and encode it as JPEG.
pub fn compose_print(frame: &Frame, style: &PrintStyle) -> Result<Vec<u8>, ComposeError> {
    let print = layout(frame, style)?;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, style.jpeg_quality.clamp(1, 100)).encode_image(&print)?;
    tracing::debug!(
        width = print.width(),
        height = print.height(),
        bytes = out.len(),
        "print composed"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    /// 2x1 frame: red on the left, blue on the right.
    fn red_blue() -> Frame {
        frame(2, 1, vec![255, 0, 0, 0, 0, 255])
    }

    #[test]
    fn test_layout_adds_border() {
        let style = PrintStyle {
            mirror: false,
            border_px: 3,
            jpeg_quality: 90,
        };
        let print = layout(&red_blue(), &style).unwrap();
        assert_eq!(print.dimensions(), (8, 7));
        assert_eq!(*print.get_pixel(0, 0), MAT_COLOUR);
        assert_eq!(*print.get_pixel(3, 3), Rgb([255, 0, 0]));
        assert_eq!(*print.get_pixel(4, 3), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_layout_mirrors() {
        let style = PrintStyle {
            mirror: true,
            border_px: 0,
            jpeg_quality: 90,
        };
        let print = layout(&red_blue(), &style).unwrap();
        assert_eq!(*print.get_pixel(0, 0), Rgb([0, 0, 255]));
        assert_eq!(*print.get_pixel(1, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_short_frame_rejected() {
        let bad = frame(4, 4, vec![0; 10]);
        assert!(matches!(
            layout(&bad, &PrintStyle::default()),
            Err(ComposeError::InvalidFrame { actual: 10, .. })
        ));
    }

    #[test]
    fn test_oversized_border_rejected() {
        let style = PrintStyle {
            border_px: u32::MAX / 2,
            ..PrintStyle::default()
        };
        assert!(matches!(
            layout(&red_blue(), &style),
            Err(ComposeError::TooLarge { border_px, .. }) if border_px == u32::MAX / 2
        ));
    }

    #[test]
    fn test_compose_print_is_jpeg() {
        let f = frame(16, 8, vec![90; 16 * 8 * 3]);
        let style = PrintStyle {
            border_px: 4,
            ..PrintStyle::default()
        };
        let jpeg = compose_print(&f, &style).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 16));
    }
}
