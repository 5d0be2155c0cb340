use std::path::Path;

use ort::{
    session::Session,
    tensor::TensorElementType,
    value::{Tensor, ValueType},
};
use tracing::info;

use crate::{
    classifier::{Classifier, ClassifierError},
    features::{FEATURE_LEN, FeatureVector},
};

/// How the predicted class is read from the session outputs.
enum LabelOutput {
    /// Tree-ensemble exports emit the class index directly.
    Index(String),
    /// Otherwise take the argmax over a score tensor.
    Scores(String),
}

/// Gesture classifier exported to ONNX, fed a `[1, 71]` float tensor.
pub struct OnnxClassifier {
    session: Session,
    output: LabelOutput,
}

impl OnnxClassifier {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let session = super::load_session(model_path, 1)
            .map_err(|e| ClassifierError::Runtime(format!("{e:#}")))?;

        let index_output = session.outputs.iter().find(|output| {
            matches!(
                output.output_type,
                ValueType::Tensor {
                    ty: TensorElementType::Int64,
                    ..
                }
            )
        });
        let output = match index_output {
            Some(output) => LabelOutput::Index(output.name.clone()),
            None => session
                .outputs
                .iter()
                .find(|output| {
                    matches!(
                        output.output_type,
                        ValueType::Tensor {
                            ty: TensorElementType::Float32,
                            ..
                        }
                    )
                })
                .map(|output| LabelOutput::Scores(output.name.clone()))
                .ok_or(ClassifierError::NoOutputTensor)?,
        };

        let (LabelOutput::Index(output_name) | LabelOutput::Scores(output_name)) = &output;
        info!(
            model = %model_path.display(),
            output = %output_name,
            "Gesture classifier loaded"
        );

        Ok(Self { session, output })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, features: &FeatureVector) -> Result<i64, ClassifierError> {
        let input = Tensor::from_array((vec![1_usize, FEATURE_LEN], features.to_vec()))
            .map_err(runtime_error)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(runtime_error)?;

        match &self.output {
            LabelOutput::Index(name) => {
                let (_, data) = outputs[name.as_str()]
                    .try_extract_tensor::<i64>()
                    .map_err(runtime_error)?;
                data.first().copied().ok_or(ClassifierError::NoOutputTensor)
            }
            LabelOutput::Scores(name) => {
                let (_, data) = outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(runtime_error)?;
                data.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(idx, _)| idx as i64)
                    .ok_or(ClassifierError::NoOutputTensor)
            }
        }
    }
}

fn runtime_error(err: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Runtime(err.to_string())
}
