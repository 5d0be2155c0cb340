//! Hand-pose feature engineering and gesture classification.
//!
//! Enable the `with-ort` feature for the ONNX Runtime landmark model and
//! classifier back-ends.

pub mod classifier;
pub mod features;
pub mod landmarks;
#[cfg(feature = "with-ort")]
pub mod onnx;
pub mod preprocess;

pub use classifier::{Classifier, ClassifierError, GestureModel, LabelDecoder};
pub use features::{FEATURE_LEN, FeatureVector, extract_features};
pub use landmarks::{HAND_CONNECTIONS, Landmark, LandmarkError, LandmarkSet, LandmarkSource};
pub use preprocess::TensorLayout;
