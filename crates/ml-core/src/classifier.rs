//! Classifier and label-decoder contracts plus the artifact loaders that do
//! not depend on an inference runtime.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::features::{FeatureVector, extract_features};
use crate::landmarks::LandmarkSet;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("inference runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("label file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label file defines no classes")]
    EmptyVocabulary,

    #[error("label file is missing class index {0}")]
    MissingIndex(usize),

    #[error("label file key {0:?} is not a class index")]
    InvalidIndex(String),

    #[error("class index {index} is outside the trained vocabulary of {vocabulary} labels")]
    UnknownClass { index: i64, vocabulary: usize },

    #[error("model produced no usable output tensor")]
    NoOutputTensor,
}

/// Maps a feature vector to a class index.
pub trait Classifier: Send {
    fn predict(&mut self, features: &FeatureVector) -> Result<i64, ClassifierError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    List(Vec<String>),
    Indexed { index_to_class: HashMap<String, String> },
}

/// Index → label table paired with a trained classifier.
#[derive(Clone, Debug)]
pub struct LabelDecoder {
    labels: Vec<String>,
}

impl LabelDecoder {
    pub fn new(labels: Vec<String>) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::EmptyVocabulary);
        }
        Ok(Self { labels })
    }

    /// Load a JSON label file: either `["A", "B", ...]` or
    /// `{"index_to_class": {"0": "A", ...}}` with contiguous indices.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ClassifierError> {
        let labels = match serde_json::from_str::<LabelFile>(content)? {
            LabelFile::List(labels) => labels,
            LabelFile::Indexed { index_to_class } => {
                let mut pairs = index_to_class
                    .into_iter()
                    .map(|(key, name)| match key.parse::<usize>() {
                        Ok(idx) => Ok((idx, name)),
                        Err(_) => Err(ClassifierError::InvalidIndex(key)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                pairs.sort_by_key(|(idx, _)| *idx);
                for (expected, (idx, _)) in pairs.iter().enumerate() {
                    if *idx != expected {
                        return Err(ClassifierError::MissingIndex(expected));
                    }
                }
                pairs.into_iter().map(|(_, name)| name).collect()
            }
        };
        debug!("Loaded {} gesture labels", labels.len());
        Self::new(labels)
    }

    pub fn decode(&self, index: i64) -> Result<&str, ClassifierError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .ok_or(ClassifierError::UnknownClass {
                index,
                vocabulary: self.labels.len(),
            })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A classifier together with the label table it was trained against.
pub struct GestureModel {
    classifier: Box<dyn Classifier>,
    labels: LabelDecoder,
}

impl GestureModel {
    pub fn new(classifier: Box<dyn Classifier>, labels: LabelDecoder) -> Self {
        Self { classifier, labels }
    }

    /// Run one inference on an all-zero vector and make sure the result
    /// decodes, so a model/label mismatch fails before anything is served.
    pub fn validate(&mut self) -> Result<String, ClassifierError> {
        let index = self.classifier.predict(&FeatureVector::zeros())?;
        self.labels.decode(index).map(str::to_owned)
    }

    pub fn classify_features(&mut self, features: &FeatureVector) -> Result<String, ClassifierError> {
        let index = self.classifier.predict(features)?;
        self.labels.decode(index).map(str::to_owned)
    }

    /// Feature extraction, classification and decoding for one hand.
    pub fn classify(&mut self, hand: &LandmarkSet) -> Result<String, ClassifierError> {
        self.classify_features(&extract_features(hand))
    }

    pub fn labels(&self) -> &LabelDecoder {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i64);

    impl Classifier for Fixed {
        fn predict(&mut self, _features: &FeatureVector) -> Result<i64, ClassifierError> {
            Ok(self.0)
        }
    }

    #[test]
    fn decodes_list_form() {
        let decoder = LabelDecoder::from_json(r#"["A", "B", "Hello"]"#).unwrap();
        assert_eq!(decoder.decode(2).unwrap(), "Hello");
        assert_eq!(decoder.len(), 3);
    }

    #[test]
    fn decodes_indexed_form_in_index_order() {
        let decoder =
            LabelDecoder::from_json(r#"{"index_to_class": {"1": "B", "0": "A", "2": "C"}}"#)
                .unwrap();
        assert_eq!(decoder.labels(), &["A", "B", "C"]);
    }

    #[test]
    fn indexed_form_must_be_contiguous() {
        let err = LabelDecoder::from_json(r#"{"index_to_class": {"0": "A", "2": "C"}}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::MissingIndex(1)));
    }

    #[test]
    fn non_numeric_keys_are_rejected() {
        let err = LabelDecoder::from_json(r#"{"index_to_class": {"0": "A", "one": "B"}}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidIndex(ref key) if key == "one"));
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        assert!(matches!(
            LabelDecoder::from_json("[]"),
            Err(ClassifierError::EmptyVocabulary)
        ));
    }

    #[test]
    fn out_of_vocabulary_indices_fail() {
        let decoder = LabelDecoder::new(vec!["A".into()]).unwrap();
        assert!(matches!(
            decoder.decode(1),
            Err(ClassifierError::UnknownClass {
                index: 1,
                vocabulary: 1
            })
        ));
        assert!(decoder.decode(-1).is_err());
    }

    #[test]
    fn validate_catches_label_mismatch() {
        let labels = LabelDecoder::new(vec!["A".into(), "B".into()]).unwrap();
        let mut model = GestureModel::new(Box::new(Fixed(5)), labels.clone());
        assert!(model.validate().is_err());

        let mut model = GestureModel::new(Box::new(Fixed(1)), labels);
        assert_eq!(model.validate().unwrap(), "B");
    }

    #[test]
    fn loads_label_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{"index_to_class": {"0": "Hello", "1": "Thanks"}}"#).unwrap();
        let decoder = LabelDecoder::from_path(&path).unwrap();
        assert_eq!(decoder.decode(1).unwrap(), "Thanks");

        assert!(matches!(
            LabelDecoder::from_path(dir.path().join("missing.json")),
            Err(ClassifierError::Io(_))
        ));
    }
}
