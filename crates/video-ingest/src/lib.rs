//! Frame acquisition for the gesture pipeline.
//!
//! Sources are pull-based: the consumer calls [`FrameSource::next_frame`] once
//! per iteration, so a slow consumer naturally throttles capture.

#[cfg(feature = "opencv")]
mod camera;
mod source;
mod stills;
mod types;

#[cfg(feature = "opencv")]
pub use camera::Camera;
pub use source::{FrameSource, parse_device_index};
pub use stills::StillImageSource;
pub use types::{CaptureError, Frame, FrameFormat};
