//! Video frame types and processing

use crate::FrameError;
use image::{GrayImage, RgbImage};
use tracing::debug;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Build an RGB frame from a single-channel buffer
    pub fn from_gray(gray: &[u8], width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        let data = gray.iter().flat_map(|&v| [v, v, v]).collect();
        Self::new(data, width, height, timestamp_ns, sequence)
    }

    /// Uniformly filled frame, mostly useful for synthetic input
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Check that dimensions and buffer length agree
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Dimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = (self.width as usize) * (self.height as usize) * 3;
        if self.data.len() != expected {
            return Err(FrameError::BufferLength {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Frame area in pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Capture timestamp in seconds
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Vec<u8> {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        gray
    }

    /// Grayscale view as an `image` buffer
    pub fn to_gray_image(&self) -> Result<GrayImage, FrameError> {
        self.validate()?;
        GrayImage::from_raw(self.width, self.height, self.to_grayscale()).ok_or(
            FrameError::Dimensions {
                width: self.width,
                height: self.height,
            },
        )
    }

    /// RGB view as an `image` buffer (copies the pixel data)
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::Dimensions {
                width: self.width,
                height: self.height,
            },
        )
    }
}

/// Decode an encoded (JPEG, PNG, ...) payload into an RGB frame
pub fn decode(bytes: &[u8], timestamp_ns: u64, sequence: u32) -> Result<VideoFrame, FrameError> {
    let img = image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    debug!("Decoded frame #{} ({}x{})", sequence, width, height);

    let frame = VideoFrame::new(rgb.into_raw(), width, height, timestamp_ns, sequence);
    frame.validate()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    #[test]
    fn test_validate_rejects_short_buffer() {
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::BufferLength { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_dimensions() {
        let frame = VideoFrame::new(vec![], 0, 0, 0, 0);
        assert!(matches!(frame.validate(), Err(FrameError::Dimensions { .. })));
    }

    #[test]
    fn test_grayscale_conversion() {
        let frame = VideoFrame::filled(2, 2, [255, 255, 255]);
        let gray = frame.to_grayscale();
        assert_eq!(gray.len(), 4);
        assert!(gray.iter().all(|&v| v >= 254));
    }

    #[test]
    fn test_from_gray_expands_channels() {
        let frame = VideoFrame::from_gray(&[10, 20], 2, 1, 0, 0);
        assert_eq!(frame.get_pixel(1, 0), Some([20, 20, 20]));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_decode_png() {
        let img = RgbImage::from_pixel(8, 6, image::Rgb([10, 200, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();

        let frame = decode(&bytes, 1_500_000_000, 7).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.get_pixel(3, 3), Some([10, 200, 30]));
        assert_eq!(frame.sequence, 7);
        assert!((frame.timestamp_s() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode(b"not an image", 0, 0), Err(FrameError::Decode(_))));
    }
}
