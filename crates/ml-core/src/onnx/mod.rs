//! ONNX Runtime back-ends for the landmark source and the gesture classifier.

mod classifier;
mod landmarker;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};

pub use classifier::OnnxClassifier;
pub use landmarker::{HandLandmarker, LandmarkerOptions};

fn load_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    let builder = Session::builder()
        .map_err(|e| anyhow!("{e}"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow!("{e}"))?
        .with_intra_threads(intra_threads)
        .map_err(|e| anyhow!("{e}"))?;
    builder
        .commit_from_file(model_path)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("failed to load model from {}", model_path.display()))
}
