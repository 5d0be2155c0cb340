use std::fmt;

use anyhow::Error;
use thiserror::Error;

/// Raw BGR8 frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source exhausted")]
    Exhausted,
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: i32,
        height: i32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Other(#[from] Error),
}

impl Frame {
    /// Wrap a BGR8 buffer, checking that its length matches the dimensions.
    pub fn from_bgr(
        data: Vec<u8>,
        width: i32,
        height: i32,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = width.max(0) as usize * height.max(0) as usize * 3;
        if data.len() != expected || width <= 0 || height <= 0 {
            return Err(CaptureError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Bgr8,
        })
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Mirror the frame around its vertical axis in place.
    pub fn flip_horizontal(&mut self) {
        let bpp = self.format.bytes_per_pixel();
        let stride = self.stride();
        let width = self.width as usize;
        for row in self.data.chunks_exact_mut(stride) {
            for col in 0..width / 2 {
                let left = col * bpp;
                let right = (width - 1 - col) * bpp;
                for channel in 0..bpp {
                    row.swap(left + channel, right + channel);
                }
            }
        }
    }

    /// BGR triple at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 3]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: i32, height: i32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        Frame::from_bgr(data, width, height, 0).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::from_bgr(vec![0; 10], 2, 2, 0).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::BufferSize {
                expected: 12,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn flip_mirrors_each_row() {
        let mut frame = gradient(5, 2);
        frame.flip_horizontal();
        assert_eq!(frame.pixel(0, 0), Some([4, 0, 7]));
        assert_eq!(frame.pixel(4, 1), Some([0, 1, 7]));
        assert_eq!(frame.pixel(2, 1), Some([2, 1, 7]));
    }

    #[test]
    fn flip_twice_is_identity() {
        let original = gradient(4, 3);
        let mut frame = original.clone();
        frame.flip_horizontal();
        frame.flip_horizontal();
        assert_eq!(frame.data, original.data);
    }

    #[test]
    fn debug_output_omits_pixel_data() {
        let rendered = format!("{:?}", gradient(2, 2));
        assert!(rendered.contains("width: 2"));
        assert!(!rendered.contains("data"));
    }

    #[test]
    fn pixel_outside_frame_is_none() {
        let frame = gradient(3, 3);
        assert_eq!(frame.pixel(-1, 0), None);
        assert_eq!(frame.pixel(3, 0), None);
    }
}
