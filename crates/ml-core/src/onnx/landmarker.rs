use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use ort::{session::Session, value::Tensor};
use tracing::{debug, info};
use video_ingest::Frame;

use crate::{
    landmarks::{LANDMARK_COUNT, LandmarkSet, LandmarkSource},
    preprocess::{Letterbox, Roi, TensorLayout, prepare_input},
};

/// Side of the tracking region relative to the previous hand's bounding box.
const ROI_EXPANSION: f32 = 2.0;

#[derive(Clone, Debug)]
pub struct LandmarkerOptions {
    /// Square model input side in pixels.
    pub input_size: u32,
    pub layout: TensorLayout,
    /// Hand presence score below which a frame counts as empty.
    pub min_confidence: f32,
    /// Treat consecutive frames as one video and track the hand between them.
    pub video_mode: bool,
}

impl Default for LandmarkerOptions {
    fn default() -> Self {
        Self {
            input_size: 224,
            layout: TensorLayout::Nchw,
            min_confidence: 0.7,
            video_mode: true,
        }
    }
}

/// Single-hand landmark model (21 × xyz in input pixels, presence score,
/// optional handedness).
pub struct HandLandmarker {
    session: Session,
    options: LandmarkerOptions,
    tracked: Option<LandmarkSet>,
}

struct RawHand {
    coords: Vec<f32>,
    presence: f32,
}

impl HandLandmarker {
    pub fn load(model_path: impl AsRef<Path>, options: LandmarkerOptions) -> Result<Self> {
        let model_path = model_path.as_ref();
        if options.input_size == 0 {
            bail!("landmark model input size must be positive");
        }
        let session = super::load_session(model_path, 2)?;
        if session.outputs.len() < 2 {
            bail!(
                "landmark model {} exposes {} outputs; expected landmarks and presence score",
                model_path.display(),
                session.outputs.len()
            );
        }
        info!(
            model = %model_path.display(),
            input_size = options.input_size,
            layout = ?options.layout,
            video_mode = options.video_mode,
            "Hand landmark model loaded"
        );
        Ok(Self {
            session,
            options,
            tracked: None,
        })
    }

    fn run(&mut self, frame: &Frame, roi: Roi) -> Result<Option<LandmarkSet>> {
        let letterbox = Letterbox::new(roi, self.options.input_size);
        let data = prepare_input(frame, &letterbox, self.options.layout);
        let shape = self.options.layout.shape(self.options.input_size).to_vec();
        let input = Tensor::from_array((shape, data)).map_err(|e| anyhow!("{e}"))?;

        let raw = {
            let outputs = self
                .session
                .run(ort::inputs![input])
                .map_err(|e| anyhow!("{e}"))
                .context("landmark model inference failed")?;
            let (_, coords) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("{e}"))?;
            let (_, presence) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("{e}"))?;
            RawHand {
                coords: coords.to_vec(),
                presence: presence.first().copied().unwrap_or(0.0),
            }
        };

        let presence = presence_probability(raw.presence);
        if presence < self.options.min_confidence {
            return Ok(None);
        }
        decode_landmarks(&raw.coords, &letterbox, frame).map(Some)
    }
}

impl LandmarkSource for HandLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        let tracked_roi = if self.options.video_mode {
            self.tracked
                .as_ref()
                .and_then(|hand| Roi::around(hand, frame, ROI_EXPANSION))
        } else {
            None
        };

        let mut hand = None;
        if let Some(roi) = tracked_roi {
            hand = self.run(frame, roi)?;
            if hand.is_none() {
                debug!("Tracked hand lost; searching the full frame");
            }
        }
        if hand.is_none() {
            hand = self.run(frame, Roi::full(frame))?;
        }

        self.tracked = if self.options.video_mode {
            hand.clone()
        } else {
            None
        };
        Ok(hand.into_iter().collect())
    }
}

/// Some exports emit the presence logit rather than a probability.
fn presence_probability(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        1.0 / (1.0 + (-raw).exp())
    }
}

fn decode_landmarks(coords: &[f32], letterbox: &Letterbox, frame: &Frame) -> Result<LandmarkSet> {
    if coords.len() < LANDMARK_COUNT * 3 {
        bail!(
            "landmark output holds {} values, expected {}",
            coords.len(),
            LANDMARK_COUNT * 3
        );
    }
    let points: Vec<_> = coords
        .chunks_exact(3)
        .take(LANDMARK_COUNT)
        .map(|c| letterbox.project(c[0], c[1], c[2], frame.width, frame.height))
        .collect();
    Ok(LandmarkSet::try_from(points.as_slice())?)
}
