//! Configuration parsing for the recognition service.
//!
//! CLI arguments are translated into a validated `ServeConfig` which the
//! runtime stages use without re-parsing flags.

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use clap::{Args, ValueEnum};
use ml_core::TensorLayout;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Where frames come from.
pub enum SourceKind {
    /// Camera index, `/dev/videoX`, video file, or stream URI (OpenCV).
    Camera(String),
    /// Directory of still images replayed once in name order.
    StillImages(PathBuf),
}

impl SourceKind {
    /// `dir:<path>` or an existing directory selects still images.
    pub(crate) fn from_uri(uri: &str) -> Self {
        if let Some(dir) = uri.strip_prefix("dir:") {
            return SourceKind::StillImages(PathBuf::from(dir));
        }
        if Path::new(uri).is_dir() {
            return SourceKind::StillImages(PathBuf::from(uri));
        }
        SourceKind::Camera(uri.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    #[default]
    Nchw,
    Nhwc,
}

impl From<LayoutArg> for TensorLayout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::Nchw => TensorLayout::Nchw,
            LayoutArg::Nhwc => TensorLayout::Nhwc,
        }
    }
}

#[derive(Clone, Debug)]
/// Model artifacts loaded once at startup.
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub labels: PathBuf,
    pub landmarker: PathBuf,
}

#[derive(Clone, Debug)]
/// Landmark model knobs.
pub struct LandmarkOptions {
    pub input_size: u32,
    pub layout: TensorLayout,
    pub min_confidence: f32,
    /// Track the hand across frames instead of treating each as a still.
    pub video_mode: bool,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing loop spans.
    pub chrome_trace_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage.
pub struct ServeConfig {
    pub source: SourceKind,
    /// Requested capture size; frames are resized when the device ignores it.
    pub capture_size: Option<(i32, i32)>,
    pub models: ModelPaths,
    pub landmarks: LandmarkOptions,
    /// Mirror frames before detection and display.
    pub mirror: bool,
    pub jpeg_quality: u8,
    pub bind: IpAddr,
    pub port: u16,
    /// Minimum spacing between still-image frames.
    pub frame_interval: Option<Duration>,
    pub telemetry: TelemetryOptions,
}

/// Artifact flags shared by `serve` and `check-models`.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// ONNX gesture classifier taking a [1, 71] feature tensor.
    #[arg(long = "classifier", value_name = "PATH", env = "GESTURE_CLASSIFIER")]
    pub classifier: Option<PathBuf>,
    /// JSON label file paired with the classifier.
    #[arg(long = "labels", value_name = "PATH", env = "GESTURE_LABELS")]
    pub labels: Option<PathBuf>,
    /// ONNX hand landmark model.
    #[arg(long = "landmarker", value_name = "PATH", env = "GESTURE_LANDMARKER")]
    pub landmarker: Option<PathBuf>,
    /// Landmark model input side in pixels.
    #[arg(long = "landmark-input-size", value_name = "PX", default_value_t = 224)]
    pub landmark_input_size: u32,
    /// Landmark model input tensor layout.
    #[arg(long = "landmark-layout", value_enum, default_value_t = LayoutArg::Nchw)]
    pub landmark_layout: LayoutArg,
    /// Hand presence threshold (0-1).
    #[arg(long = "min-detection-confidence", value_name = "P", default_value_t = 0.7)]
    pub min_detection_confidence: f32,
    /// Treat every frame as an unrelated still image (no hand tracking).
    #[arg(long = "static-images", action = clap::ArgAction::SetTrue)]
    pub static_images: bool,
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ServeCliArgs {
    /// Camera index, device path, video URI, or `dir:<path>` of still images.
    #[arg(long = "source", value_name = "URI", default_value = "0")]
    pub source: String,
    #[command(flatten)]
    pub models: ModelArgs,
    /// Requested capture width in pixels.
    #[arg(long = "width", value_name = "PX", requires = "height")]
    pub width: Option<i32>,
    /// Requested capture height in pixels.
    #[arg(long = "height", value_name = "PX", requires = "width")]
    pub height: Option<i32>,
    /// Do not mirror frames horizontally.
    #[arg(long = "no-mirror", action = clap::ArgAction::SetTrue)]
    pub no_mirror: bool,
    /// JPEG quality used by the stream encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: i32,
    /// Address the HTTP server binds to.
    #[arg(long = "bind", value_name = "ADDR", default_value = "127.0.0.1")]
    pub bind: IpAddr,
    /// HTTP port.
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Pacing between still-image frames in milliseconds (0 disables).
    #[arg(long = "frame-interval-ms", value_name = "MS", default_value_t = 33)]
    pub frame_interval_ms: u64,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl ModelArgs {
    pub(crate) fn model_paths(&self) -> Result<ModelPaths> {
        let classifier = self.classifier.clone().ok_or_else(|| {
            anyhow!("Missing classifier. Provide --classifier <path> or GESTURE_CLASSIFIER.")
        })?;
        let labels = self
            .labels
            .clone()
            .ok_or_else(|| anyhow!("Missing labels. Provide --labels <path> or GESTURE_LABELS."))?;
        let landmarker = self.landmarker.clone().ok_or_else(|| {
            anyhow!("Missing landmark model. Provide --landmarker <path> or GESTURE_LANDMARKER.")
        })?;
        Ok(ModelPaths {
            classifier,
            labels,
            landmarker,
        })
    }

    pub(crate) fn landmark_options(&self) -> Result<LandmarkOptions> {
        if self.landmark_input_size == 0 {
            bail!("--landmark-input-size must be a positive integer");
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            bail!("--min-detection-confidence must be between 0 and 1");
        }
        Ok(LandmarkOptions {
            input_size: self.landmark_input_size,
            layout: self.landmark_layout.into(),
            min_confidence: self.min_detection_confidence,
            video_mode: !self.static_images,
        })
    }
}

impl TryFrom<ServeCliArgs> for ServeConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeCliArgs) -> Result<Self> {
        let models = args.models.model_paths()?;
        let landmarks = args.models.landmark_options()?;

        let capture_size = match (args.width, args.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            (None, None) => None,
            _ => bail!("Capture width and height must both be positive integers"),
        };

        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }

        let frame_interval =
            (args.frame_interval_ms > 0).then(|| Duration::from_millis(args.frame_interval_ms));

        Ok(Self {
            source: SourceKind::from_uri(&args.source),
            capture_size,
            models,
            landmarks,
            mirror: !args.no_mirror,
            jpeg_quality: args.jpeg_quality as u8,
            bind: args.bind,
            port: args.port,
            frame_interval,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeCliArgs,
    }

    fn parse(extra: &[&str]) -> Result<ServeConfig> {
        let mut argv = vec![
            "gesture-server",
            "--classifier",
            "model.onnx",
            "--labels",
            "labels.json",
            "--landmarker",
            "hand.onnx",
        ];
        argv.extend_from_slice(extra);
        ServeConfig::try_from(Harness::try_parse_from(argv)?.args)
    }

    #[test]
    fn defaults_serve_camera_zero_on_port_5000() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, SourceKind::Camera("0".into()));
        assert_eq!(config.port, 5000);
        assert!(config.mirror);
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.landmarks.video_mode);
        assert!((config.landmarks.min_confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.capture_size, None);
    }

    #[test]
    fn dir_prefix_selects_still_images() {
        let config = parse(&["--source", "dir:/tmp/frames"]).unwrap();
        assert_eq!(
            config.source,
            SourceKind::StillImages(PathBuf::from("/tmp/frames"))
        );
    }

    #[test]
    fn existing_directory_selects_still_images() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().to_str().unwrap();
        assert_eq!(
            SourceKind::from_uri(uri),
            SourceKind::StillImages(dir.path().to_path_buf())
        );
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "101"]).is_err());
    }

    #[test]
    fn capture_size_needs_both_dimensions() {
        assert!(parse(&["--width", "640"]).is_err());
        let config = parse(&["--width", "640", "--height", "480"]).unwrap();
        assert_eq!(config.capture_size, Some((640, 480)));
        assert!(parse(&["--width", "0", "--height", "480"]).is_err());
    }

    #[test]
    fn confidence_must_be_a_probability() {
        assert!(parse(&["--min-detection-confidence", "1.5"]).is_err());
    }

    #[test]
    fn static_images_disables_tracking() {
        let config = parse(&["--static-images", "--no-mirror"]).unwrap();
        assert!(!config.landmarks.video_mode);
        assert!(!config.mirror);
    }
}
