//! RGB frame type and pixel helpers (YUYV conversion, luma and dark detection).

/// A captured colour frame, packed RGB8.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Mean BT.601 luma (0.0–255.0).
    pub fn mean_luma(&self) -> f32 {
        mean_luma(&self.data)
    }

    /// Whether the frame looks like a covered lens or an unlit sensor.
    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.data, DARK_PIXEL_FRACTION)
    }
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_PIXEL_FRACTION: f32 = 0.95;

const DARK_LUMA: u8 = 32;

/// Convert packed YUYV (4:2:2) to RGB8 using integer BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clip = |x: i32| x.clamp(0, 255) as u8;
    out.push(clip((298 * c + 409 * e + 128) >> 8));
    out.push(clip((298 * c - 100 * d - 208 * e + 128) >> 8));
    out.push(clip((298 * c + 516 * d + 128) >> 8));
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b)) >> 8) as u8
}

/// Mean luma of packed RGB8 data. Empty input is 0.
pub fn mean_luma(rgb: &[u8]) -> f32 {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return 0.0;
    }
    let sum: u64 = rgb
        .chunks_exact(3)
        .map(|p| u64::from(luma(p[0], p[1], p[2])))
        .sum();
    sum as f32 / pixels as f32
}

/// True if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark = rgb
        .chunks_exact(3)
        .filter(|p| luma(p[0], p[1], p[2]) < DARK_LUMA)
        .count();
    (dark as f32 / pixels as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_neutral_chroma() {
        // 2x1: studio white and studio black, no colour.
        let yuyv = vec![235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_yuyv_to_rgb_mid_grey() {
        let yuyv = vec![126, 128, 126, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![128; 6]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_chroma_dominates() {
        let yuyv = vec![82, 90, 82, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 200, "red channel {}", rgb[0]);
        assert!(rgb[1] < 40 && rgb[2] < 40);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → not dark
        let mut rgb = vec![10u8; 940 * 3];
        rgb.extend(vec![200u8; 60 * 3]);
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_mean_luma() {
        assert_eq!(mean_luma(&[]), 0.0);
        let white = mean_luma(&[255, 255, 255, 255, 255, 255]);
        assert!(white >= 254.0);
        let half = mean_luma(&[0, 0, 0, 255, 255, 255]);
        assert!((half - 127.0).abs() <= 1.0);
    }
}
