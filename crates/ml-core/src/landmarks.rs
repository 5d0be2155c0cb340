//! Hand landmark data model and the landmark-source contract.

use thiserror::Error;
use video_ingest::Frame;

/// Number of keypoints tracked per hand.
pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

/// Fingertips other than the thumb, in feature order.
pub const FINGER_TIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Skeleton edges between landmark indices, used for drawing.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// One keypoint: `x`/`y` relative to the image (roughly `[0, 1]`), `z` a
/// relative depth estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("a hand has 21 landmarks, got {0}")]
    Count(usize),
}

/// Exactly 21 landmarks of one detected hand, wrist first.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn wrist(&self) -> Landmark {
        self.points[WRIST]
    }

    /// Axis-aligned `(min_x, min_y, max_x, max_y)` over all points.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }
}

impl TryFrom<&[Landmark]> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(points: &[Landmark]) -> Result<Self, Self::Error> {
        let points: [Landmark; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| LandmarkError::Count(points.len()))?;
        Ok(Self { points })
    }
}

impl TryFrom<&[[f32; 3]]> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(coords: &[[f32; 3]]) -> Result<Self, Self::Error> {
        let points: Vec<Landmark> = coords
            .iter()
            .map(|&[x, y, z]| Landmark::new(x, y, z))
            .collect();
        Self::try_from(points.as_slice())
    }
}

/// Finds hands in a frame.
///
/// Returns zero or more landmark sets. Implementations may keep tracking
/// state between calls when they are fed a continuous video.
pub trait LandmarkSource: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<LandmarkSet>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_point_count() {
        let points = vec![Landmark::default(); 20];
        assert_eq!(
            LandmarkSet::try_from(points.as_slice()),
            Err(LandmarkError::Count(20))
        );
    }

    #[test]
    fn builds_from_coordinate_triples() {
        let coords: Vec<[f32; 3]> = (0..21).map(|i| [i as f32, 0.5, -0.1]).collect();
        let set = LandmarkSet::try_from(coords.as_slice()).unwrap();
        assert_eq!(set.points()[20], Landmark::new(20.0, 0.5, -0.1));
        assert_eq!(set.wrist(), Landmark::new(0.0, 0.5, -0.1));
    }

    #[test]
    fn bounds_cover_all_points() {
        let mut points = [Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
        points[3] = Landmark::new(0.1, 0.9, 0.0);
        points[17] = Landmark::new(0.8, 0.2, 0.0);
        let set = LandmarkSet::new(points);
        assert_eq!(set.bounds(), (0.1, 0.2, 0.8, 0.9));
    }

    #[test]
    fn connections_stay_inside_the_hand() {
        assert!(
            HAND_CONNECTIONS
                .iter()
                .all(|&(a, b)| a < LANDMARK_COUNT && b < LANDMARK_COUNT)
        );
    }
}
