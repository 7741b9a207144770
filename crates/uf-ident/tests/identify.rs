//! Integration test: identifying unit models from self-generated data.
//!
//! Data is produced by simulating a known `UnitModel`, then identified back:
//! - Noise-free recovery of gain, bias and time constant
//! - Time-delay search picks the true delay
//! - Bad samples and constant inputs are tolerated
//! - Numerical failure is captured, not propagated

use uf_core::DEFAULT_BAD_VALUE;
use uf_ident::{IdentError, IdentifierConfig, UnitDataSet, UnitIdentifier, simulate_unit};
use uf_models::{ModelWarning, SimulatableModel, UnitModel, UnitParameters};

const LEVELS: [f64; 16] = [
    0.0, 1.0, 0.3, 0.8, -0.5, 0.2, 1.2, -0.2, 0.6, 0.0, 0.9, -0.4, 0.4, 1.0, 0.1, 0.7,
];

/// Piecewise-constant excitation, one level every `hold` samples.
fn steps(n: usize, hold: usize, offset: usize) -> Vec<f64> {
    (0..n)
        .map(|k| LEVELS[(k / hold + offset) % LEVELS.len()])
        .collect()
}

fn generate(params: &UnitParameters, u: Vec<Vec<f64>>, dt: f64) -> UnitDataSet {
    let n = u[0].len();
    let mut data = UnitDataSet::new(vec![0.0; n], u, dt);
    data.y_meas = simulate_unit(params, &data);
    data
}

fn config(max_delay_samples: usize) -> IdentifierConfig {
    IdentifierConfig {
        max_delay_samples,
        ..IdentifierConfig::default()
    }
}

fn rel_err(a: f64, b: f64) -> f64 {
    (a - b).abs() / b.abs()
}

#[test]
fn recovers_gain_bias_and_time_constant() {
    let truth = UnitParameters::new(vec![2.0], 1.0).with_time_constant(10.0);
    let data = generate(&truth, vec![steps(400, 25, 0)], 1.0);

    let id = UnitIdentifier::new(config(0)).identify(&data).unwrap();
    let fit = id.fitting.as_ref().unwrap();
    assert!(fit.able_to_identify);
    assert!(rel_err(id.linear_gains[0], 2.0) < 0.01, "gain {}", id.linear_gains[0]);
    assert!(rel_err(id.time_constant_s, 10.0) < 0.02, "T {}", id.time_constant_s);
    assert!((id.bias - 1.0).abs() < 0.02, "bias {}", id.bias);
    assert_eq!(id.time_delay_s, 0.0);
    assert!(fit.r_squared_sim.unwrap() > 0.999);
    assert!(id.linear_gain_unc.is_some());
    assert!(id.time_constant_unc_s.is_some());

    // identified parameters are directly simulatable
    let model = UnitModel::new("identified", id);
    assert!(model.is_simulatable().0);
}

#[test]
fn delay_search_finds_true_delay() {
    let truth = UnitParameters::new(vec![1.5], -2.0)
        .with_time_constant(8.0)
        .with_time_delay(3.0);
    let data = generate(&truth, vec![steps(400, 25, 0)], 1.0);

    let id = UnitIdentifier::new(config(6)).identify(&data).unwrap();
    assert_eq!(id.time_delay_s, 3.0);
    assert!(rel_err(id.linear_gains[0], 1.5) < 0.02);
    assert!((id.bias + 2.0).abs() < 0.02);
    assert!(!id.warnings.contains(&ModelWarning::DelayAtSearchLimit));
}

#[test]
fn delay_on_search_limit_is_flagged() {
    let truth = UnitParameters::new(vec![1.0], 0.0)
        .with_time_constant(5.0)
        .with_time_delay(4.0);
    let data = generate(&truth, vec![steps(300, 20, 0)], 1.0);

    let id = UnitIdentifier::new(config(2)).identify(&data).unwrap();
    assert_eq!(id.time_delay_s, 2.0);
    assert!(id.warnings.contains(&ModelWarning::DelayAtSearchLimit));
}

#[test]
fn bad_sample_at_step_changes_gain_negligibly() {
    let truth = UnitParameters::new(vec![2.0], 1.0).with_time_constant(10.0);
    let clean = generate(&truth, vec![steps(400, 25, 0)], 1.0);
    let mut dirty = clean.clone();
    dirty.y_meas[25] = DEFAULT_BAD_VALUE;
    dirty.y_meas[100] = f64::NAN;
    dirty.u[0][150] = DEFAULT_BAD_VALUE;

    let identifier = UnitIdentifier::new(config(0));
    let a = identifier.identify(&clean).unwrap();
    let b = identifier.identify(&dirty).unwrap();
    assert!(b.fitting.as_ref().unwrap().able_to_identify);
    assert!(rel_err(b.linear_gains[0], a.linear_gains[0]) < 0.01);
    // the first sample has no predecessor; bad samples take their next row along
    assert_eq!(a.fitting.as_ref().unwrap().n_excluded, 1);
    let fit = b.fitting.as_ref().unwrap();
    assert_eq!(fit.n_total, 400);
    assert_eq!(fit.n_excluded, 6);
}

#[test]
fn constant_input_gets_near_zero_gain() {
    let truth = UnitParameters::new(vec![2.0, 0.0], 1.0).with_time_constant(10.0);
    let u = vec![steps(400, 25, 0), vec![3.0; 400]];
    let data = generate(&truth, u, 1.0);

    let id = UnitIdentifier::new(config(0)).identify(&data).unwrap();
    assert!(id.linear_gains[1].abs() < 1e-3, "gain {}", id.linear_gains[1]);
    assert!(rel_err(id.linear_gains[0], 2.0) < 0.01);
    assert!(id.warnings.contains(&ModelWarning::ConstantInput { index: 1 }));
    assert!(id.warnings.contains(&ModelWarning::RankDeficientInputs));
}

#[test]
fn static_identification_of_two_inputs() {
    let truth = UnitParameters::new(vec![0.5, -1.5], 4.0);
    let u = vec![steps(200, 7, 0), steps(200, 11, 5)];
    let data = generate(&truth, u, 1.0);

    let config = IdentifierConfig {
        dynamic: false,
        max_delay_samples: 0,
        ..IdentifierConfig::default()
    };
    let id = UnitIdentifier::new(config).identify(&data).unwrap();
    assert_eq!(id.time_constant_s, 0.0);
    assert!(rel_err(id.linear_gains[0], 0.5) < 0.01);
    assert!(rel_err(id.linear_gains[1], -1.5) < 0.01);
    assert!((id.bias - 4.0).abs() < 0.02);
}

#[test]
fn recovers_curvature_around_operating_point() {
    let truth = UnitParameters::new(vec![1.0], 0.5)
        .with_time_constant(5.0)
        .with_curvatures(vec![0.8])
        .with_operating_point(vec![0.3])
        .with_u_norm(vec![2.0]);
    let data = generate(&truth, vec![steps(400, 25, 0)], 1.0);

    let config = IdentifierConfig {
        max_delay_samples: 0,
        u0: Some(vec![0.3]),
        u_norm: Some(vec![2.0]),
        curvature_inputs: vec![0],
        ..IdentifierConfig::default()
    };
    let id = UnitIdentifier::new(config).identify(&data).unwrap();
    let curvature = id.curvatures.as_ref().unwrap()[0];
    assert!(rel_err(id.linear_gains[0], 1.0) < 0.02, "gain {}", id.linear_gains[0]);
    assert!(rel_err(curvature, 0.8) < 0.03, "curvature {curvature}");
    assert!(rel_err(id.time_constant_s, 5.0) < 0.02, "T {}", id.time_constant_s);
    assert!((id.bias - 0.5).abs() < 0.01, "bias {}", id.bias);
    assert_eq!(id.u0, Some(vec![0.3]));
    assert_eq!(id.u_norm, Some(vec![2.0]));
    assert!(id.curvature_unc.is_some());
    assert!(UnitModel::new("curved", id).is_simulatable().0);
}

#[test]
fn known_disturbance_is_removed_before_fitting() {
    let truth = UnitParameters::new(vec![2.0], 0.0).with_time_constant(6.0);
    let u = steps(400, 25, 0);
    let d = steps(400, 13, 3).iter().map(|v| 0.5 * v).collect::<Vec<_>>();
    let mut data = UnitDataSet::new(vec![0.0; 400], vec![u], 1.0).with_disturbance(d);
    data.y_meas = simulate_unit(&truth, &data);

    let id = UnitIdentifier::new(config(0)).identify(&data).unwrap();
    assert!(rel_err(id.linear_gains[0], 2.0) < 0.01);
    assert!(rel_err(id.time_constant_s, 6.0) < 0.02);
}

#[test]
fn all_bad_output_is_captured_as_failed_fit() {
    let u = steps(50, 5, 0);
    let data = UnitDataSet::new(vec![DEFAULT_BAD_VALUE; 50], vec![u], 1.0);
    let id = UnitIdentifier::new(config(2)).identify(&data).unwrap();
    assert!(!id.is_identified());
    assert!(id.warnings.iter().any(|w| matches!(w, ModelWarning::RegressionFailed { .. })));

    let model = UnitModel::new("failed", id);
    assert!(!model.is_simulatable().0);
}

#[test]
fn malformed_data_is_an_error() {
    let data = UnitDataSet::new(vec![0.0; 10], vec![vec![0.0; 9]], 1.0);
    let err = UnitIdentifier::default().identify(&data).unwrap_err();
    assert!(matches!(err, IdentError::ProblemSetup { .. }));
}

#[test]
fn config_from_yaml() {
    let yaml = "dynamic: false\nmax_delay_samples: 3\nregression:\n  confidence_z: 2.58\n";
    let config: IdentifierConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(!config.dynamic);
    assert_eq!(config.max_delay_samples, 3);
    assert_eq!(config.regression.confidence_z, 2.58);
    assert_eq!(config.regression.constant_column_threshold, 1e-3);
}
