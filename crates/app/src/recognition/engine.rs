//! Model loading and frame-source construction.
//!
//! Artifacts are loaded once at startup; any failure here is fatal so the
//! server never starts with a classifier it cannot decode.

use std::time::Duration;

use anyhow::{Context, Result};
use ml_core::{ClassifierError, GestureModel, LandmarkSet, LandmarkSource};
use video_ingest::{Frame, FrameSource, StillImageSource};

use crate::recognition::config::{LandmarkOptions, ModelPaths, SourceKind};

/// Landmark source plus the classifier and its label table.
pub(crate) struct RecognitionEngine {
    landmarks: Box<dyn LandmarkSource>,
    model: GestureModel,
}

impl RecognitionEngine {
    pub(crate) fn new(landmarks: Box<dyn LandmarkSource>, model: GestureModel) -> Self {
        Self { landmarks, model }
    }

    #[cfg(feature = "with-ort")]
    pub(crate) fn load(models: &ModelPaths, options: &LandmarkOptions) -> Result<Self> {
        use ml_core::{
            LabelDecoder,
            onnx::{HandLandmarker, LandmarkerOptions, OnnxClassifier},
        };
        use tracing::info;

        let labels = LabelDecoder::from_path(&models.labels)
            .with_context(|| format!("failed to load labels from {}", models.labels.display()))?;
        let classifier = OnnxClassifier::load(&models.classifier).with_context(|| {
            format!(
                "failed to load classifier from {}",
                models.classifier.display()
            )
        })?;
        let mut model = GestureModel::new(Box::new(classifier), labels);
        let probe = model
            .validate()
            .context("classifier output does not decode with the label file")?;
        info!(
            classes = model.labels().len(),
            probe = %probe,
            "Gesture classifier ready"
        );

        let landmarker = HandLandmarker::load(
            &models.landmarker,
            LandmarkerOptions {
                input_size: options.input_size,
                layout: options.layout,
                min_confidence: options.min_confidence,
                video_mode: options.video_mode,
            },
        )?;

        Ok(Self::new(Box::new(landmarker), model))
    }

    #[cfg(not(feature = "with-ort"))]
    pub(crate) fn load(_models: &ModelPaths, _options: &LandmarkOptions) -> Result<Self> {
        anyhow::bail!(
            "gesture-server was built without the `with-ort` feature; rebuild with `--features with-ort` to load ONNX models"
        )
    }

    pub(crate) fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        self.landmarks.detect(frame)
    }

    pub(crate) fn classify(&mut self, hand: &LandmarkSet) -> Result<String, ClassifierError> {
        self.model.classify(hand)
    }

    pub(crate) fn labels(&self) -> &[String] {
        self.model.labels().labels()
    }
}

/// Open the configured frame source. Called on the stream thread so the
/// capture device lives exactly as long as one loop instance.
pub(crate) fn open_source(
    kind: &SourceKind,
    capture_size: Option<(i32, i32)>,
    frame_interval: Option<Duration>,
) -> Result<Box<dyn FrameSource>> {
    match kind {
        SourceKind::StillImages(dir) => {
            let source = StillImageSource::open(dir, frame_interval)
                .with_context(|| format!("failed to open image directory {}", dir.display()))?;
            Ok(Box::new(source))
        }
        SourceKind::Camera(uri) => open_camera(uri, capture_size),
    }
}

#[cfg(feature = "with-opencv")]
fn open_camera(uri: &str, capture_size: Option<(i32, i32)>) -> Result<Box<dyn FrameSource>> {
    let camera = video_ingest::Camera::open(uri, capture_size)
        .with_context(|| format!("failed to open capture source {uri}"))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "with-opencv"))]
fn open_camera(uri: &str, _capture_size: Option<(i32, i32)>) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "camera source {uri:?} needs the `with-opencv` feature; use `--source dir:<path>` for still images"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_directory_is_an_error() {
        let kind = SourceKind::StillImages("/nonexistent/gesture-frames".into());
        assert!(open_source(&kind, None, None).is_err());
    }

    #[test]
    fn opens_still_image_directories() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
            .save(dir.path().join("a.png"))
            .unwrap();
        let mut source =
            open_source(&SourceKind::StillImages(dir.path().into()), None, None).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 4));
    }

    #[cfg(not(feature = "with-ort"))]
    #[test]
    fn loading_without_onnx_runtime_names_the_feature() {
        let models = ModelPaths {
            classifier: "c.onnx".into(),
            labels: "l.json".into(),
            landmarker: "h.onnx".into(),
        };
        let options = LandmarkOptions {
            input_size: 224,
            layout: Default::default(),
            min_confidence: 0.7,
            video_mode: true,
        };
        let err = RecognitionEngine::load(&models, &options).err().unwrap();
        assert!(err.to_string().contains("with-ort"));
    }
}
