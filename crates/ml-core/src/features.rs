//! Fixed-length feature encoding of a single hand pose.
//!
//! Layout (71 values), which every trained classifier depends on:
//!
//! | range   | content                                                  |
//! |---------|----------------------------------------------------------|
//! | 0..63   | wrist-centred, scale-normalised `x, y, z` per landmark   |
//! | 63..67  | thumb tip to index / middle / ring / pinky tip distances |
//! | 67..71  | wrist to index / middle / ring / pinky tip distances     |

use crate::landmarks::{FINGER_TIPS, LANDMARK_COUNT, LandmarkSet, THUMB_TIP, WRIST};

pub const COORDINATE_FEATURES: usize = LANDMARK_COUNT * 3;
pub const PINCH_FEATURES: usize = FINGER_TIPS.len();
pub const BEND_FEATURES: usize = FINGER_TIPS.len();
/// Total feature count.
pub const FEATURE_LEN: usize = COORDINATE_FEATURES + PINCH_FEATURES + BEND_FEATURES;

type Point = [f64; 3];

/// Classifier input for one hand.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_LEN])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.0.to_vec()
    }

    /// Normalised coordinates, one triple per landmark.
    pub fn coordinates(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.0[..COORDINATE_FEATURES]
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
    }

    pub fn pinch_distances(&self) -> &[f32] {
        &self.0[COORDINATE_FEATURES..COORDINATE_FEATURES + PINCH_FEATURES]
    }

    pub fn bend_distances(&self) -> &[f32] {
        &self.0[COORDINATE_FEATURES + PINCH_FEATURES..]
    }
}

/// Encode a landmark set.
///
/// Translation and scale are removed by centring on the wrist and dividing by
/// the largest wrist distance. A hand whose points all coincide with the
/// wrist is divided by 1 instead and therefore encodes as all zeros.
pub fn extract_features(hand: &LandmarkSet) -> FeatureVector {
    let wrist = hand.wrist();
    let centred: [Point; LANDMARK_COUNT] = std::array::from_fn(|i| {
        let p = hand.points()[i];
        [
            f64::from(p.x) - f64::from(wrist.x),
            f64::from(p.y) - f64::from(wrist.y),
            f64::from(p.z) - f64::from(wrist.z),
        ]
    });

    let max_dist = centred.iter().map(norm).fold(0.0_f64, f64::max);
    let scale = if max_dist > 0.0 { max_dist } else { 1.0 };
    let normalised = centred.map(|[x, y, z]| [x / scale, y / scale, z / scale]);

    let mut out = [0.0_f32; FEATURE_LEN];
    for (slot, value) in out.iter_mut().zip(normalised.iter().flatten()) {
        *slot = *value as f32;
    }

    let thumb = normalised[THUMB_TIP];
    let wrist = normalised[WRIST];
    for (i, &tip) in FINGER_TIPS.iter().enumerate() {
        out[COORDINATE_FEATURES + i] = distance(&thumb, &normalised[tip]) as f32;
        out[COORDINATE_FEATURES + PINCH_FEATURES + i] = distance(&wrist, &normalised[tip]) as f32;
    }

    FeatureVector(out)
}

fn norm(p: &Point) -> f64 {
    (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
}

fn distance(a: &Point, b: &Point) -> f64 {
    norm(&[a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}
