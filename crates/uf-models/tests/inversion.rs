//! Integration test: steady-state output and input are inverse operations.

use proptest::prelude::*;
use uf_core::DEFAULT_BAD_VALUE;
use uf_models::{ModelError, SimulatableModel, UnitModel, UnitParameters};

#[test]
fn curvature_inversion_returns_smaller_root() {
    let params = UnitParameters::new(vec![1.5, -0.5], 2.0)
        .with_curvatures(vec![0.2, 0.0])
        .with_operating_point(vec![1.0, 0.0])
        .with_u_norm(vec![2.0, 1.0]);
    let model = UnitModel::new("curved", params);

    // 0.1 x^2 + 1.5 x = 0.775 has roots x = 0.5 and x = -15.5
    let u = [1.5, 3.0];
    let y0 = model.steady_state_output(&u, DEFAULT_BAD_VALUE).unwrap();
    let back = model.steady_state_input(y0, 0, &u).unwrap();
    assert!((back - (1.0 - 15.5)).abs() < 1e-9, "back = {back}");

    let y_back = model
        .steady_state_output(&[back, 3.0], DEFAULT_BAD_VALUE)
        .unwrap();
    assert!((y_back - y0).abs() < 1e-9);
}

#[test]
fn unreachable_output_has_no_real_solution() {
    // y = u^2 can never be negative
    let params = UnitParameters::new(vec![0.0], 0.0).with_curvatures(vec![1.0]);
    let model = UnitModel::new("sq", params);
    let err = model.steady_state_input(-1.0, 0, &[0.0]).unwrap_err();
    assert_eq!(err, ModelError::NoRealSolution { input_index: 0 });
}

proptest! {
    #[test]
    fn linear_round_trip(
        gains in prop::collection::vec(prop_oneof![-5.0_f64..-0.1, 0.1_f64..5.0], 1..4),
        bias in -10.0_f64..10.0,
        seed in prop::collection::vec(-50.0_f64..50.0, 4),
        disturbance in -5.0_f64..5.0,
        k_raw in 0usize..4,
    ) {
        let n = gains.len();
        let k = k_raw % n;
        let model = UnitModel::new("lin", UnitParameters::new(gains, bias));
        let mut u: Vec<f64> = seed[..n].to_vec();
        u.push(disturbance);

        let y0 = model.steady_state_output(&u, DEFAULT_BAD_VALUE).unwrap();
        let uk = model.steady_state_input(y0, k, &u).unwrap();
        prop_assert!((uk - u[k]).abs() <= 1e-9 * (1.0 + u[k].abs() + y0.abs()));
    }
}
