//! OpenCV-backed camera capture.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, warn};

use crate::{
    source::{FrameSource, parse_device_index},
    types::{CaptureError, Frame},
};

/// Consecutive empty reads tolerated while a device warms up.
const MAX_EMPTY_READS: usize = 30;

/// Synchronous camera handle. The device is released when the value drops.
pub struct Camera {
    uri: String,
    cap: VideoCapture,
    frame: Mat,
    scratch: Mat,
    target_size: Option<(i32, i32)>,
}

impl Camera {
    /// Open a device index, `/dev/videoX` path, file, or stream URI.
    ///
    /// When `target_size` is set the device is asked for that resolution and
    /// frames that still arrive at a different size are resized.
    pub fn open(uri: &str, target_size: Option<(i32, i32)>) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, 30.0);
        debug!("Opened capture device {uri}");
        Ok(Self {
            uri: uri.to_string(),
            cap,
            frame: Mat::default(),
            scratch: Mat::default(),
            target_size,
        })
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut empty_reads = 0;
        loop {
            let grabbed = self
                .cap
                .read(&mut self.frame)
                .map_err(|e| CaptureError::Other(e.into()))?;
            if !grabbed {
                return Err(CaptureError::Exhausted);
            }
            let size = self
                .frame
                .size()
                .map_err(|e| CaptureError::Other(e.into()))?;
            if size.width > 0 && size.height > 0 {
                break;
            }
            empty_reads += 1;
            if empty_reads >= MAX_EMPTY_READS {
                return Err(CaptureError::Exhausted);
            }
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        let (width, height, working) = match self.target_size {
            Some((target_w, target_h)) if size.width != target_w || size.height != target_h => {
                opencv::imgproc::resize(
                    &self.frame,
                    &mut self.scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                (target_w, target_h, &self.scratch)
            }
            _ => (size.width, size.height, &self.frame),
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Frame::from_bgr(data, width, height, Utc::now().timestamp_millis())
    }

    fn describe(&self) -> String {
        format!("camera {}", self.uri)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        match self.cap.release() {
            Ok(()) => debug!("Released capture device {}", self.uri),
            Err(err) => warn!("Failed to release capture device {}: {err}", self.uri),
        }
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    match VideoCapture::from_file(uri, videoio::CAP_ANY) {
        Ok(cap) => {
            if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                return Ok(cap);
            }
        }
        Err(err) => {
            warn!("failed to open {uri}: {err}");
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply common capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, target_size: Option<(i32, i32)>, fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    if let Some((width, height)) = target_size {
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
