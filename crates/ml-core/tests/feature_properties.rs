use ml_core::{FEATURE_LEN, Landmark, LandmarkSet, extract_features, features::COORDINATE_FEATURES};
use proptest::prelude::*;

fn landmark() -> impl Strategy<Value = Landmark> {
    (0.0f32..1.0, 0.0f32..1.0, -0.1f32..0.1).prop_map(|(x, y, z)| Landmark::new(x, y, z))
}

fn hand() -> impl Strategy<Value = LandmarkSet> {
    prop::collection::vec(landmark(), 21)
        .prop_map(|points| LandmarkSet::try_from(points.as_slice()).unwrap())
        // near-collapsed hands amplify f32 rounding past the tolerances below
        .prop_filter("points spread out", |hand| {
            let wrist = hand.wrist();
            hand.points()
                .iter()
                .any(|p| (p.x - wrist.x).abs() + (p.y - wrist.y).abs() > 0.05)
        })
}

fn shifted(hand: &LandmarkSet, dx: f32, dy: f32, dz: f32) -> LandmarkSet {
    let points: Vec<Landmark> = hand
        .points()
        .iter()
        .map(|p| Landmark::new(p.x + dx, p.y + dy, p.z + dz))
        .collect();
    LandmarkSet::try_from(points.as_slice()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn normalised_coordinates_peak_at_unit_norm(hand in hand()) {
        let features = extract_features(&hand);
        let max_norm = features
            .coordinates()
            .map(|[x, y, z]| (x * x + y * y + z * z).sqrt())
            .fold(0.0_f32, f32::max);
        prop_assert!((max_norm - 1.0).abs() < 1e-5, "max norm {}", max_norm);
    }

    #[test]
    fn translation_does_not_change_features(
        hand in hand(),
        dx in -0.5f32..0.5,
        dy in -0.5f32..0.5,
        dz in -0.5f32..0.5,
    ) {
        let a = extract_features(&hand);
        let b = extract_features(&shifted(&hand, dx, dy, dz));
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            // f32 inputs lose a few ulps when shifted
            prop_assert!((x - y).abs() < 1e-4, "{} vs {}", x, y);
        }
    }

    #[test]
    fn length_is_always_seventy_one(hand in hand()) {
        prop_assert_eq!(extract_features(&hand).as_slice().len(), FEATURE_LEN);
    }

    #[test]
    fn wrist_is_the_origin(hand in hand()) {
        let features = extract_features(&hand);
        prop_assert_eq!(&features.as_slice()[..3], &[0.0, 0.0, 0.0]);
    }
}

#[test]
fn collapsed_hand_yields_zeros() {
    let collapsed = LandmarkSet::new([Landmark::new(0.3, 0.3, 0.3); 21]);
    let features = extract_features(&collapsed);
    assert_eq!(features.as_slice().len(), 71);
    assert_eq!(COORDINATE_FEATURES, 63);
    assert!(features.as_slice().iter().all(|&v| v == 0.0));
}
