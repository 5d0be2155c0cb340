//! Letterboxed model input preparation and the inverse projection of model
//! outputs back into frame-normalised coordinates.

use image::{Rgb, RgbImage, imageops};
use video_ingest::Frame;

use crate::landmarks::{Landmark, LandmarkSet};

/// Channel ordering of the image tensor a model expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, S, S]`
    #[default]
    Nchw,
    /// `[1, S, S, 3]`
    Nhwc,
}

impl TensorLayout {
    pub fn shape(self, size: u32) -> [usize; 4] {
        let s = size as usize;
        match self {
            TensorLayout::Nchw => [1, 3, s, s],
            TensorLayout::Nhwc => [1, s, s, 3],
        }
    }
}

/// Region of a frame, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Roi {
    pub fn full(frame: &Frame) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: frame.width as f32,
            height: frame.height as f32,
        }
    }

    /// Square region centred on a hand, its side `scale` times the longer
    /// side of the hand's bounding box, clipped to the frame.
    pub fn around(hand: &LandmarkSet, frame: &Frame, scale: f32) -> Option<Self> {
        let (w, h) = (frame.width as f32, frame.height as f32);
        let (min_x, min_y, max_x, max_y) = hand.bounds();
        let centre_x = (min_x + max_x) * 0.5 * w;
        let centre_y = (min_y + max_y) * 0.5 * h;
        let side = ((max_x - min_x) * w).max((max_y - min_y) * h) * scale;

        let left = (centre_x - side * 0.5).clamp(0.0, w);
        let top = (centre_y - side * 0.5).clamp(0.0, h);
        let right = (centre_x + side * 0.5).clamp(0.0, w);
        let bottom = (centre_y + side * 0.5).clamp(0.0, h);
        if right - left < 8.0 || bottom - top < 8.0 {
            return None;
        }
        Some(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// Aspect-preserving fit of a [`Roi`] into a square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub roi: Roi,
    pub size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn new(roi: Roi, size: u32) -> Self {
        let target = size as f32;
        let scale = target / roi.width.max(roi.height).max(1.0);
        Self {
            roi,
            size,
            scale,
            pad_x: (target - roi.width * scale) * 0.5,
            pad_y: (target - roi.height * scale) * 0.5,
        }
    }

    fn scaled_dims(&self) -> (u32, u32) {
        let w = (self.roi.width * self.scale).round().clamp(1.0, self.size as f32);
        let h = (self.roi.height * self.scale).round().clamp(1.0, self.size as f32);
        (w as u32, h as u32)
    }

    /// Map a point in model-input pixels back to frame-normalised
    /// coordinates. Depth is scaled like `x`.
    pub fn project(&self, x: f32, y: f32, z: f32, frame_width: i32, frame_height: i32) -> Landmark {
        let frame_x = (x - self.pad_x) / self.scale + self.roi.x;
        let frame_y = (y - self.pad_y) / self.scale + self.roi.y;
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        Landmark::new(frame_x / fw, frame_y / fh, z / self.scale / fw)
    }
}

/// Crop, resize and pad the region into an RGB float tensor in `[0, 1]`.
pub fn prepare_input(frame: &Frame, letterbox: &Letterbox, layout: TensorLayout) -> Vec<f32> {
    let roi = letterbox.roi;
    let left = roi.x.floor().max(0.0) as i32;
    let top = roi.y.floor().max(0.0) as i32;
    let crop_w = (roi.width.ceil() as i32).clamp(1, (frame.width - left).max(1)) as u32;
    let crop_h = (roi.height.ceil() as i32).clamp(1, (frame.height - top).max(1)) as u32;

    let crop = RgbImage::from_fn(crop_w, crop_h, |x, y| {
        let [b, g, r] = frame
            .pixel(left + x as i32, top + y as i32)
            .unwrap_or([0, 0, 0]);
        Rgb([r, g, b])
    });

    let (scaled_w, scaled_h) = letterbox.scaled_dims();
    let resized = imageops::resize(&crop, scaled_w, scaled_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::new(letterbox.size, letterbox.size);
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x.round() as i64,
        letterbox.pad_y.round() as i64,
    );

    let size = letterbox.size as usize;
    let plane = size * size;
    let mut tensor = vec![0.0_f32; plane * 3];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let idx = y as usize * size + x as usize;
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            match layout {
                TensorLayout::Nchw => tensor[channel * plane + idx] = value,
                TensorLayout::Nhwc => tensor[idx * 3 + channel] = value,
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LANDMARK_COUNT;

    fn solid(width: i32, height: i32, bgr: [u8; 3]) -> Frame {
        let data = bgr.repeat((width * height) as usize);
        Frame::from_bgr(data, width, height, 0).unwrap()
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid(200, 100, [0, 0, 0]);
        let lb = Letterbox::new(Roi::full(&frame), 100);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert!((lb.pad_x).abs() < 1e-6);
        assert!((lb.pad_y - 25.0).abs() < 1e-6);
    }

    #[test]
    fn projection_inverts_the_letterbox() {
        let frame = solid(200, 100, [0, 0, 0]);
        let lb = Letterbox::new(Roi::full(&frame), 100);
        // frame centre lands on the input centre
        let p = lb.project(50.0, 50.0, 0.0, frame.width, frame.height);
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
        // bottom-right of the image content
        let p = lb.project(100.0, 75.0, 0.0, frame.width, frame.height);
        assert!((p.x - 1.0).abs() < 1e-6);
        assert!((p.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn projection_accounts_for_roi_offset() {
        let frame = solid(400, 400, [0, 0, 0]);
        let roi = Roi {
            x: 100.0,
            y: 200.0,
            width: 50.0,
            height: 50.0,
        };
        let lb = Letterbox::new(roi, 100);
        let p = lb.project(0.0, 0.0, 0.0, frame.width, frame.height);
        assert!((p.x - 0.25).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tensor_is_rgb_with_black_padding() {
        // pure blue in BGR order
        let frame = solid(4, 2, [255, 0, 0]);
        let lb = Letterbox::new(Roi::full(&frame), 4);
        let tensor = prepare_input(&frame, &lb, TensorLayout::Nchw);
        assert_eq!(tensor.len(), 3 * 16);

        let plane = 16;
        let centre = 4 + 1;
        assert_eq!(tensor[centre], 0.0);
        assert_eq!(tensor[plane + centre], 0.0);
        assert!((tensor[2 * plane + centre] - 1.0).abs() < 1e-6);
        // first row is padding
        assert_eq!(tensor[2 * plane], 0.0);

        let nhwc = prepare_input(&frame, &lb, TensorLayout::Nhwc);
        assert!((nhwc[centre * 3 + 2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn roi_around_hand_is_clipped() {
        let frame = solid(100, 100, [0, 0, 0]);
        let mut points = [Landmark::new(0.05, 0.05, 0.0); LANDMARK_COUNT];
        points[8] = Landmark::new(0.25, 0.25, 0.0);
        let hand = LandmarkSet::new(points);
        let roi = Roi::around(&hand, &frame, 2.0).unwrap();
        assert_eq!(roi.x, 0.0);
        assert_eq!(roi.y, 0.0);
        assert!((roi.width - 35.0).abs() < 1e-4);
    }

    #[test]
    fn roi_around_a_point_is_rejected() {
        let frame = solid(100, 100, [0, 0, 0]);
        let hand = LandmarkSet::new([Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT]);
        assert!(Roi::around(&hand, &frame, 2.0).is_none());
    }
}
