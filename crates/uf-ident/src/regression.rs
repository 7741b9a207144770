//! Robust linear regression `y ≈ X·gains + bias`.
//!
//! The engine never fails loudly: numerical trouble is captured on the
//! returned [`RegressionResult`] as a warning with `able_to_identify = false`.
//!
//! # Procedure
//!
//! 1. Append a constant column for the bias
//! 2. Check rank and near-constant columns over the valid samples
//! 3. Drop excluded and non-finite rows
//! 4. Append one zero-target row per regularized gain
//! 5. Solve the augmented system with SVD
//! 6. Refit without regularization for the parameter covariance

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use uf_core::WarningList;

use crate::error::{IdentError, IdentResult};
use crate::metrics::FitMetrics;

/// Name recorded as the solver of every fit.
pub const SOLVER_ID: &str = "svd";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Regularization row weight per sample; the weight is `n · factor`.
    pub regularization_per_sample: f64,
    /// Columns whose range over valid samples falls below this are flagged.
    pub constant_column_threshold: f64,
    /// Singular values below `rank_tolerance · σ_max` count as zero.
    pub rank_tolerance: f64,
    /// z-value of the reported confidence half-widths.
    pub confidence_z: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            regularization_per_sample: 1e-3,
            constant_column_threshold: 1e-3,
            rank_tolerance: 1e-10,
            confidence_z: 1.96,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionWarning {
    /// Regressors (with the bias column) are linearly dependent.
    RankDeficient { rank: usize, columns: usize },
    /// Regressor `index` barely varies over the valid samples.
    ConstantColumn { index: usize },
    SolverFailed { solver: String, what: String },
}

/// Outcome of [`regress`].
#[derive(Debug, Clone)]
pub struct RegressionResult {
    pub able_to_identify: bool,
    /// One coefficient per regressor column.
    pub gains: Vec<f64>,
    pub bias: f64,
    /// `gains` followed by `bias`.
    pub params: Vec<f64>,
    /// Confidence half-widths, index-parallel to `params`.
    pub param_conf: Option<Vec<f64>>,
    pub covariance: Option<DMatrix<f64>>,
    /// Fitted output for every sample; excluded samples are interpolated.
    pub y_modelled: Vec<f64>,
    pub r_squared: f64,
    /// Sum of squared residuals over valid samples.
    pub objective_value: f64,
    pub n_total: usize,
    pub n_excluded: usize,
    pub warnings: WarningList<RegressionWarning>,
}

impl RegressionResult {
    fn failed(n_total: usize, n_excluded: usize, n_cols: usize, warnings: WarningList<RegressionWarning>) -> Self {
        Self {
            able_to_identify: false,
            gains: vec![f64::NAN; n_cols],
            bias: f64::NAN,
            params: vec![f64::NAN; n_cols + 1],
            param_conf: None,
            covariance: None,
            y_modelled: vec![f64::NAN; n_total],
            r_squared: f64::NAN,
            objective_value: f64::NAN,
            n_total,
            n_excluded,
            warnings,
        }
    }

    pub fn solver_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, RegressionWarning::SolverFailed { .. }))
    }
}

/// Fit `y ≈ Σ gains_j·regressors[j] + bias`.
///
/// `regressors` holds one column per gain, each as long as `y`. Rows listed
/// in `excluded` or holding a non-finite value are left out. `regularize`
/// names the gain columns pulled towards zero; `None` means all of them. The
/// bias is never regularized.
pub fn regress(
    y: &[f64],
    regressors: &[Vec<f64>],
    excluded: &[usize],
    regularize: Option<&[usize]>,
    config: &RegressionConfig,
) -> RegressionResult {
    let valid = valid_rows(y, regressors, excluded);
    let n_excluded = valid.iter().filter(|v| !**v).count();
    let mut warnings = WarningList::new();

    match try_regress(y, regressors, &valid, regularize, config, &mut warnings) {
        Ok(mut result) => {
            result.n_excluded = n_excluded;
            result.warnings = warnings;
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "regression failed");
            warnings.push(RegressionWarning::SolverFailed {
                solver: SOLVER_ID.to_string(),
                what: e.to_string(),
            });
            RegressionResult::failed(y.len(), n_excluded, regressors.len(), warnings)
        }
    }
}

fn valid_rows(y: &[f64], regressors: &[Vec<f64>], excluded: &[usize]) -> Vec<bool> {
    let mut valid: Vec<bool> = (0..y.len())
        .map(|i| {
            y[i].is_finite()
                && regressors
                    .iter()
                    .all(|col| col.get(i).is_some_and(|v| v.is_finite()))
        })
        .collect();
    for &i in excluded {
        if let Some(v) = valid.get_mut(i) {
            *v = false;
        }
    }
    valid
}

fn singular_eps(singular_values: &DVector<f64>, rel: f64) -> f64 {
    let max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    (rel * max).max(f64::MIN_POSITIVE)
}

fn try_regress(
    y: &[f64],
    regressors: &[Vec<f64>],
    valid: &[bool],
    regularize: Option<&[usize]>,
    config: &RegressionConfig,
    warnings: &mut WarningList<RegressionWarning>,
) -> IdentResult<RegressionResult> {
    let n_total = y.len();
    let n_cols = regressors.len();
    if n_cols == 0 {
        return Err(IdentError::ProblemSetup {
            what: "no regressors".to_string(),
        });
    }
    if let Some(j) = regressors.iter().position(|c| c.len() != n_total) {
        return Err(IdentError::ProblemSetup {
            what: format!(
                "regressor {j} has {} samples, output has {n_total}",
                regressors[j].len()
            ),
        });
    }

    let rows: Vec<usize> = (0..n_total).filter(|&i| valid[i]).collect();
    let p = n_cols + 1;
    if rows.len() < p {
        return Err(IdentError::Numeric {
            what: format!(
                "{} valid samples for {p} parameters",
                rows.len()
            ),
        });
    }

    let x = DMatrix::from_fn(rows.len(), p, |r, c| {
        if c < n_cols { regressors[c][rows[r]] } else { 1.0 }
    });
    let y_valid = DVector::from_iterator(rows.len(), rows.iter().map(|&i| y[i]));

    for (j, col) in regressors.iter().enumerate() {
        let (lo, hi) = rows
            .iter()
            .map(|&i| col[i])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if hi - lo < config.constant_column_threshold {
            warnings.push(RegressionWarning::ConstantColumn { index: j });
        }
    }

    let sv = x.clone().svd(false, false).singular_values;
    let rank_eps = singular_eps(&sv, config.rank_tolerance);
    let rank = sv.iter().filter(|s| **s > rank_eps).count();
    if rank < p {
        tracing::debug!(rank, columns = p, "rank-deficient regressors");
        warnings.push(RegressionWarning::RankDeficient { rank, columns: p });
    }

    let reg_cols: Vec<usize> = match regularize {
        Some(cols) => cols.iter().copied().filter(|&j| j < n_cols).collect(),
        None => (0..n_cols).collect(),
    };
    let reg_weight = (n_total as f64 * config.regularization_per_sample).max(0.0);
    let reg_scale = reg_weight.sqrt();
    let n_rows = rows.len() + reg_cols.len();

    let mut a = DMatrix::zeros(n_rows, p);
    a.view_mut((0, 0), (rows.len(), p)).copy_from(&x);
    for (k, &j) in reg_cols.iter().enumerate() {
        a[(rows.len() + k, j)] = reg_scale;
    }
    let mut b = DVector::zeros(n_rows);
    b.rows_mut(0, rows.len()).copy_from(&y_valid);

    let svd = a.svd(true, true);
    let eps = singular_eps(&svd.singular_values, config.rank_tolerance);
    let params = svd.solve(&b, eps).map_err(|what| IdentError::Numeric {
        what: what.to_string(),
    })?;
    if params.iter().any(|v| !v.is_finite()) {
        return Err(IdentError::Numeric {
            what: "non-finite parameters".to_string(),
        });
    }

    let fitted = &x * &params;
    let mut y_modelled = vec![f64::NAN; n_total];
    for (r, &i) in rows.iter().enumerate() {
        y_modelled[i] = fitted[r];
    }
    fill_excluded(&mut y_modelled, valid);

    let metrics = FitMetrics::compute(y_valid.as_slice(), fitted.as_slice(), &[]);
    let (covariance, param_conf) = covariance(&x, &y_valid, config);

    let params: Vec<f64> = params.iter().copied().collect();
    let able_to_identify = params.iter().any(|v| *v != 0.0);
    Ok(RegressionResult {
        able_to_identify,
        gains: params[..n_cols].to_vec(),
        bias: params[n_cols],
        params,
        param_conf,
        covariance,
        y_modelled,
        r_squared: metrics.r_squared,
        objective_value: metrics.sse,
        n_total,
        n_excluded: 0,
        warnings: WarningList::new(),
    })
}

/// Covariance `mse · pinv(XᵀX)` of an unregularized refit and the matching
/// confidence half-widths. `None` when the refit itself fails.
fn covariance(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    config: &RegressionConfig,
) -> (Option<DMatrix<f64>>, Option<Vec<f64>>) {
    let svd = x.clone().svd(true, true);
    let eps = singular_eps(&svd.singular_values, config.rank_tolerance);
    let Ok(p_unreg) = svd.solve(y, eps) else {
        return (None, None);
    };
    let residual = y - x * &p_unreg;
    let dof = x.nrows().saturating_sub(x.ncols()).max(1);
    let mse = residual.norm_squared() / dof as f64;

    let xtx = x.transpose() * x;
    let xtx_eps = singular_eps(&xtx.clone().svd(false, false).singular_values, config.rank_tolerance);
    let Ok(pinv) = xtx.pseudo_inverse(xtx_eps) else {
        return (None, None);
    };
    let cov = pinv * mse;
    let conf = cov
        .diagonal()
        .iter()
        .map(|v| config.confidence_z * v.max(0.0).sqrt())
        .collect();
    (Some(cov), Some(conf))
}

/// Linear interpolation across invalid samples; hold when only one side has
/// a valid neighbour.
fn fill_excluded(values: &mut [f64], valid: &[bool]) {
    let mut prev: Option<usize> = None;
    let mut i = 0;
    while i < values.len() {
        if valid[i] {
            prev = Some(i);
            i += 1;
            continue;
        }
        let next = (i..values.len()).find(|&j| valid[j]);
        let end = next.unwrap_or(values.len());
        for k in i..end {
            values[k] = match (prev, next) {
                (Some(a), Some(b)) => {
                    let t = (k - a) as f64 / (b - a) as f64;
                    values[a] + t * (values[b] - values[a])
                }
                (Some(a), None) => values[a],
                (None, Some(b)) => values[b],
                (None, None) => f64::NAN,
            };
        }
        i = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let y = x.iter().map(|v| 2.0 * v + 1.0).collect();
        (x, y)
    }

    #[test]
    fn exact_line_without_regularization() {
        let (x, y) = line(50);
        let r = regress(&y, &[x], &[], Some(&[][..]), &RegressionConfig::default());
        assert!(r.able_to_identify);
        assert!((r.gains[0] - 2.0).abs() < 1e-9);
        assert!((r.bias - 1.0).abs() < 1e-9);
        assert!((r.r_squared - 1.0).abs() < 1e-12);
        assert!(r.warnings.is_empty());
        assert_eq!(r.params.len(), 2);
    }

    #[test]
    fn regularization_shrinks_gain_slightly() {
        let (x, y) = line(50);
        let r = regress(&y, &[x], &[], None, &RegressionConfig::default());
        assert!(r.gains[0] < 2.0);
        assert!((r.gains[0] - 2.0).abs() < 0.01);
    }

    #[test]
    fn excluded_rows_are_ignored_and_interpolated() {
        let (x, mut y) = line(20);
        y[5] = 1000.0;
        y[6] = f64::NAN;
        let r = regress(&y, &[x], &[5], Some(&[][..]), &RegressionConfig::default());
        assert_eq!(r.n_excluded, 2);
        assert!((r.gains[0] - 2.0).abs() < 1e-9);
        // interpolated between rows 4 and 7
        let expected = 2.0 * 0.5 + 1.0;
        assert!((r.y_modelled[5] - expected).abs() < 1e-9);
    }

    #[test]
    fn constant_column_is_flagged_with_near_zero_gain() {
        let (x, y) = line(40);
        let c = vec![5.0; 40];
        let r = regress(&y, &[x, c], &[], None, &RegressionConfig::default());
        assert!(r.warnings.contains(&RegressionWarning::ConstantColumn { index: 1 }));
        assert!(r.warnings.contains(&RegressionWarning::RankDeficient { rank: 2, columns: 3 }));
        assert!(r.gains[1].abs() < 1e-6, "gain = {}", r.gains[1]);
        assert!(r.able_to_identify);
    }

    #[test]
    fn too_few_samples_fails_softly() {
        let r = regress(&[1.0], &[vec![1.0]], &[], None, &RegressionConfig::default());
        assert!(!r.able_to_identify);
        assert!(r.solver_failed());
        assert!(r.bias.is_nan());
    }

    #[test]
    fn length_mismatch_fails_softly() {
        let r = regress(&[1.0, 2.0, 3.0], &[vec![1.0, 2.0]], &[], None, &RegressionConfig::default());
        assert!(r.solver_failed());
    }

    #[test]
    fn all_zero_parameters_are_not_identified() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let r = regress(&[0.0; 10], &[x], &[], None, &RegressionConfig::default());
        assert!(!r.able_to_identify);
        assert!(!r.solver_failed());
    }

    #[test]
    fn confidence_intervals_cover_noisy_fit() {
        let x: Vec<f64> = (0..200).map(|i| (i as f64 * 0.37).sin()).collect();
        let noise = |i: usize| 0.05 * (((i * 7919) % 97) as f64 / 97.0 - 0.5);
        let y: Vec<f64> = x.iter().enumerate().map(|(i, v)| 3.0 * v - 2.0 + noise(i)).collect();
        let r = regress(&y, &[x], &[], Some(&[][..]), &RegressionConfig::default());
        let conf = r.param_conf.expect("confidence");
        assert_eq!(conf.len(), 2);
        assert!(conf.iter().all(|c| *c > 0.0 && *c < 0.05));
        assert!((r.gains[0] - 3.0).abs() < 3.0 * conf[0] + 1e-3);
        let cov = r.covariance.expect("covariance");
        assert_eq!(cov.shape(), (2, 2));
    }

    #[test]
    fn interpolation_holds_at_edges() {
        let mut v = vec![f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN];
        fill_excluded(&mut v, &[false, true, false, true, false]);
        assert_eq!(v, vec![1.0, 1.0, 2.0, 3.0, 3.0]);
    }
}
