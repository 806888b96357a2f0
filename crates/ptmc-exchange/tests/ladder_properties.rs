use proptest::prelude::*;
use ptmc_exchange::{build_ladder, LadderConfig};

fn ladder(t_min: f64, t_max: f64, participants: usize) -> Vec<f64> {
    build_ladder(&LadderConfig { t_min, t_max }, participants).unwrap()
}

#[test]
fn four_ranks_from_one_to_eight_double_each_step() {
    let temps = ladder(1.0, 8.0, 4);
    let expected = [1.0, 2.0, 4.0, 8.0];
    for (t, e) in temps.iter().zip(expected) {
        assert!((t - e).abs() < 1e-12, "ladder {temps:?}");
    }
}

#[test]
fn two_ranks_take_both_bounds() {
    assert_eq!(ladder(0.5, 3.0, 2), vec![0.5, 3.0]);
}

#[test]
fn inverted_bounds_are_rejected() {
    let err = build_ladder(&LadderConfig { t_min: 2.0, t_max: 2.0 }, 4).unwrap_err();
    assert_eq!(err.info().code, "ladder-bounds");
    let err = build_ladder(&LadderConfig { t_min: 3.0, t_max: 1.0 }, 4).unwrap_err();
    assert_eq!(err.info().code, "ladder-bounds");
}

#[test]
fn non_positive_minimum_is_rejected() {
    let err = build_ladder(&LadderConfig { t_min: 0.0, t_max: 1.0 }, 4).unwrap_err();
    assert_eq!(err.info().code, "ladder-positive");
}

#[test]
fn single_participant_is_rejected() {
    let err = build_ladder(&LadderConfig::default(), 1).unwrap_err();
    assert_eq!(err.info().code, "ladder-participants");
}

proptest! {
    #[test]
    fn ladder_is_geometric_and_pinned(
        t_min in 0.01f64..50.0,
        span in 1.001f64..100.0,
        participants in 2usize..64,
    ) {
        let t_max = t_min * span;
        let temps = ladder(t_min, t_max, participants);

        prop_assert_eq!(temps.len(), participants);
        prop_assert_eq!(temps[0], t_min);
        prop_assert_eq!(temps[participants - 1], t_max);
        for pair in temps.windows(2) {
            prop_assert!(pair[1] > pair[0], "not ascending: {:?}", temps);
        }
        let ratio = temps[1] / temps[0];
        for pair in temps.windows(2) {
            prop_assert!((pair[1] / pair[0] - ratio).abs() < 1e-9 * ratio);
        }
    }
}
