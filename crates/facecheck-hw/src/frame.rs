//! Captured frames and pixel conversion.
//!
//! The face engine consumes interleaved RGB8, so conversion from the camera's
//! native format happens here, at capture time. YUYV frames get a full BT.601
//! chroma conversion; GREY frames are expanded by channel replication.

/// A captured camera frame, already converted to interleaved RGB8.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB8 pixel data (width * height * 3 bytes).
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    /// Set when the source frame was mostly black (lens covered, AGC still
    /// settling). Dark frames are useless for detection.
    pub is_dark: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("short frame buffer: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
}

/// Convert packed YUYV 4:2:2 into interleaved RGB8 using BT.601 coefficients.
///
/// Each 4-byte group [Y0, U, Y1, V] yields two RGB pixels sharing the same
/// chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::ShortBuffer { expected, actual: yuyv.len() });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for group in yuyv[..expected].chunks_exact(4) {
        let u = group[1] as f32 - 128.0;
        let v = group[3] as f32 - 128.0;
        for &y in &[group[0], group[2]] {
            let y = y as f32;
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

/// Expand an 8-bit grayscale plane into RGB8 by replicating the luma value.
pub fn gray_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    if gray.len() < pixels {
        return Err(FrameError::ShortBuffer { expected: pixels, actual: gray.len() });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for &y in &gray[..pixels] {
        rgb.extend_from_slice(&[y, y, y]);
    }
    Ok(rgb)
}

/// Whether more than `threshold_pct` of pixels are near-black.
///
/// A pixel counts as dark when all three channels are below 32 (the darkest
/// bucket of an 8-bucket histogram). An empty buffer is dark.
pub fn is_dark_rgb(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark = rgb
        .chunks_exact(3)
        .filter(|px| px[0] < 32 && px[1] < 32 && px[2] < 32)
        .count();
    (dark as f32 / pixels as f32) > threshold_pct
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // U=V=128 means zero chroma: RGB equals luma on all channels.
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_cast() {
        // High V pushes the red channel up and green down.
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > rgb[2], "red {} should exceed blue {}", rgb[0], rgb[2]);
        assert!(rgb[1] < 128);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_output_length() {
        let yuyv = vec![128u8; 4 * 2 * 2]; // 4x2 frame
        assert_eq!(yuyv_to_rgb(&yuyv, 4, 2).unwrap().len(), 4 * 2 * 3);
    }

    #[test]
    fn test_gray_expansion() {
        let rgb = gray_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_gray_short_buffer() {
        assert!(gray_to_rgb(&[7], 2, 1).is_err());
    }

    #[test]
    fn test_dark_all_black() {
        assert!(is_dark_rgb(&vec![0u8; 3000], 0.95));
    }

    #[test]
    fn test_dark_lit_frame() {
        assert!(!is_dark_rgb(&vec![128u8; 3000], 0.95));
    }

    #[test]
    fn test_dark_empty() {
        assert!(is_dark_rgb(&[], 0.95));
    }

    #[test]
    fn test_dark_single_bright_channel_counts_as_lit() {
        // A blue-only pixel is not "dark" even though R and G are.
        let mut rgb = vec![0u8; 3000];
        for px in rgb.chunks_exact_mut(3) {
            px[2] = 200;
        }
        assert!(!is_dark_rgb(&rgb, 0.95));
    }

    #[test]
    fn test_dark_borderline() {
        // 96% dark pixels trips the detector; 94% does not.
        let mut mostly_dark = vec![10u8; 960 * 3];
        mostly_dark.extend(vec![128u8; 40 * 3]);
        assert!(is_dark_rgb(&mostly_dark, 0.95));

        let mut mostly_lit = vec![10u8; 940 * 3];
        mostly_lit.extend(vec![128u8; 60 * 3]);
        assert!(!is_dark_rgb(&mostly_lit, 0.95));
    }
}
