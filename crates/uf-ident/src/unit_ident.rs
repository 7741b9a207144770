//! Identification of [`UnitParameters`] from sampled data.
//!
//! The dynamic fit regresses the one-step difference
//!
//! `y[k] − y[k−1] = (a−1)·y[k−1] + Σ b_i·(u_i[k−d] − u0_i) + Σ c_i·(u_i[k−d] − u0_i)²/u_norm_i + q`
//!
//! and converts `a`, `b`, `c` into time constant, gains and curvatures. Each
//! candidate delay `d` is fitted independently (in parallel) and the one whose
//! simulated output matches the measurement best is kept.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uf_core::{DEFAULT_BAD_VALUE, Diagnostics, append_trailing_indices, bad_sample_indices, is_usable_sample};
use uf_models::{FittingResult, ModelWarning, SimulatableModel, UnitModel, UnitParameters};

use crate::error::{IdentError, IdentResult};
use crate::metrics::FitMetrics;
use crate::regression::{RegressionConfig, RegressionResult, RegressionWarning, SOLVER_ID, regress};

fn default_bad_value() -> f64 {
    DEFAULT_BAD_VALUE
}

/// Measured output and inputs sampled at a fixed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDataSet {
    pub y_meas: Vec<f64>,
    /// One column per input.
    pub u: Vec<Vec<f64>>,
    /// Known additive disturbance on the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Vec<f64>>,
    pub time_base_s: f64,
    #[serde(default = "default_bad_value")]
    pub bad_value: f64,
    /// Sample indices left out of the fit.
    #[serde(default)]
    pub excluded: Vec<usize>,
}

impl UnitDataSet {
    pub fn new(y_meas: Vec<f64>, u: Vec<Vec<f64>>, time_base_s: f64) -> Self {
        Self {
            y_meas,
            u,
            d: None,
            time_base_s,
            bad_value: DEFAULT_BAD_VALUE,
            excluded: Vec::new(),
        }
    }

    pub fn with_disturbance(mut self, d: Vec<f64>) -> Self {
        self.d = Some(d);
        self
    }

    pub fn len(&self) -> usize {
        self.y_meas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_meas.is_empty()
    }

    pub fn n_inputs(&self) -> usize {
        self.u.len()
    }

    /// Model input vector at sample `k`, disturbance last.
    pub fn input_row(&self, k: usize) -> Vec<f64> {
        let mut row: Vec<f64> = self.u.iter().map(|col| col[k]).collect();
        if let Some(d) = &self.d {
            row.push(d[k]);
        }
        row
    }

    pub fn validate(&self) -> IdentResult<()> {
        let n = self.len();
        if n < 3 {
            return Err(IdentError::ProblemSetup {
                what: format!("{n} samples are too few to identify a model"),
            });
        }
        if self.u.is_empty() {
            return Err(IdentError::ProblemSetup {
                what: "no input columns".to_string(),
            });
        }
        if let Some(i) = self.u.iter().position(|c| c.len() != n) {
            return Err(IdentError::ProblemSetup {
                what: format!("input {i} has {} samples, output has {n}", self.u[i].len()),
            });
        }
        if self.d.as_ref().is_some_and(|d| d.len() != n) {
            return Err(IdentError::ProblemSetup {
                what: "disturbance length differs from output".to_string(),
            });
        }
        if !(self.time_base_s.is_finite() && self.time_base_s > 0.0) {
            return Err(IdentError::ProblemSetup {
                what: format!("time base {} must be positive", self.time_base_s),
            });
        }
        Ok(())
    }

    /// Output with the known disturbance removed; NaN where either is bad.
    pub(crate) fn process_output(&self) -> Vec<f64> {
        let bad = self.bad_value;
        match &self.d {
            None => self
                .y_meas
                .iter()
                .map(|&y| if is_usable_sample(y, bad) { y } else { f64::NAN })
                .collect(),
            Some(d) => self
                .y_meas
                .iter()
                .zip(d)
                .map(|(&y, &dk)| {
                    if is_usable_sample(y, bad) && is_usable_sample(dk, bad) {
                        y - dk
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
        }
    }
}

/// Value ranges outside which samples are not fitted.
///
/// Per-input limits that are not finite mean "no limit" for that input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingSpecs {
    pub y_min_fit: Option<f64>,
    pub y_max_fit: Option<f64>,
    pub u_min_fit: Option<Vec<f64>>,
    pub u_max_fit: Option<Vec<f64>>,
}

impl FittingSpecs {
    /// Samples that fall outside any configured range.
    pub fn excluded_indices(&self, data: &UnitDataSet) -> Vec<usize> {
        (0..data.len())
            .filter(|&k| {
                let y = data.y_meas[k];
                let y_out = self.y_min_fit.is_some_and(|lo| y < lo)
                    || self.y_max_fit.is_some_and(|hi| y > hi);
                let u_out = data.u.iter().enumerate().any(|(i, col)| {
                    let u = col[k];
                    limit(&self.u_min_fit, i).is_some_and(|lo| u < lo)
                        || limit(&self.u_max_fit, i).is_some_and(|hi| u > hi)
                });
                y_out || u_out
            })
            .collect()
    }
}

fn limit(limits: &Option<Vec<f64>>, i: usize) -> Option<f64> {
    limits
        .as_ref()
        .and_then(|v| v.get(i).copied())
        .filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Fit a time constant; `false` gives a static model.
    pub dynamic: bool,
    /// Candidate delays are `0..=max_delay_samples`.
    pub max_delay_samples: usize,
    /// Inputs whose gains are regularized; `None` means all.
    pub regularize_inputs: Option<Vec<usize>>,
    pub u0: Option<Vec<f64>>,
    pub u_norm: Option<Vec<f64>>,
    /// Inputs that get a curvature term.
    pub curvature_inputs: Vec<usize>,
    pub fitting: FittingSpecs,
    pub regression: RegressionConfig,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            dynamic: true,
            max_delay_samples: 5,
            regularize_inputs: None,
            u0: None,
            u_norm: None,
            curvature_inputs: Vec::new(),
            fitting: FittingSpecs::default(),
            regression: RegressionConfig::default(),
        }
    }
}

impl IdentifierConfig {
    fn validate(&self, n_inputs: usize) -> IdentResult<()> {
        let check_len = |name: &str, v: &Option<Vec<f64>>| match v {
            Some(v) if v.len() != n_inputs => Err(IdentError::ProblemSetup {
                what: format!("{name} has {} entries for {n_inputs} inputs", v.len()),
            }),
            _ => Ok(()),
        };
        check_len("u0", &self.u0)?;
        check_len("u_norm", &self.u_norm)?;
        if self
            .u_norm
            .as_ref()
            .is_some_and(|v| v.iter().any(|x| !x.is_finite() || *x == 0.0))
        {
            return Err(IdentError::ProblemSetup {
                what: "u_norm entries must be finite and non-zero".to_string(),
            });
        }
        let out_of_range = self
            .curvature_inputs
            .iter()
            .chain(self.regularize_inputs.iter().flatten())
            .find(|&&i| i >= n_inputs);
        if let Some(i) = out_of_range {
            return Err(IdentError::ProblemSetup {
                what: format!("input index {i} outside {n_inputs} inputs"),
            });
        }
        Ok(())
    }

    fn u0_at(&self, i: usize) -> f64 {
        self.u0.as_ref().and_then(|v| v.get(i).copied()).unwrap_or(0.0)
    }

    fn u_norm_at(&self, i: usize) -> f64 {
        self.u_norm.as_ref().and_then(|v| v.get(i).copied()).unwrap_or(1.0)
    }
}

/// Sample-level masks shared by every fit candidate.
pub(crate) struct Exclusions {
    /// Samples whose output may not be used, sorted.
    pub(crate) y: Vec<usize>,
    /// Samples where some input is bad.
    pub(crate) u: Vec<bool>,
}

impl Exclusions {
    pub(crate) fn new(data: &UnitDataSet, specs: &FittingSpecs) -> Self {
        let n = data.len();
        let mut y = bad_sample_indices(&data.process_output(), data.bad_value);
        y.extend(data.excluded.iter().copied().filter(|&k| k < n));
        y.extend(specs.excluded_indices(data));
        y.sort_unstable();
        y.dedup();

        let mut u = vec![false; n];
        for col in &data.u {
            for k in bad_sample_indices(col, data.bad_value) {
                u[k] = true;
            }
        }
        Self { y, u }
    }

    /// Output mask for regression rows; with `lag` a bad sample also
    /// spoils the row after it.
    pub(crate) fn output_rows(&self, n: usize, lag: bool) -> Vec<bool> {
        let rows = if lag {
            append_trailing_indices(&self.y, n)
        } else {
            self.y.clone()
        };
        let mut bad = vec![false; n];
        for k in rows {
            bad[k] = true;
        }
        bad
    }

    pub(crate) fn output_ok(&self, k: usize) -> bool {
        self.y.binary_search(&k).is_err()
    }
}

/// Regressor layout: `[lag?] inputs.. curvatures..`.
struct Layout {
    lag: bool,
    n_inputs: usize,
    curvature_inputs: Vec<usize>,
}

impl Layout {
    fn input_col(&self, i: usize) -> usize {
        usize::from(self.lag) + i
    }

    fn curvature_col(&self, j: usize) -> usize {
        usize::from(self.lag) + self.n_inputs + j
    }

    /// Map a regressor column back to the input it belongs to.
    fn input_of(&self, col: usize) -> Option<usize> {
        let first = usize::from(self.lag);
        if col < first {
            return None;
        }
        let k = col - first;
        if k < self.n_inputs {
            Some(k)
        } else {
            self.curvature_inputs.get(k - self.n_inputs).copied()
        }
    }
}

/// Fits unit models with a time-delay search.
#[derive(Debug, Clone, Default)]
pub struct UnitIdentifier {
    config: IdentifierConfig,
}

impl UnitIdentifier {
    pub fn new(config: IdentifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IdentifierConfig {
        &self.config
    }

    /// Identify a unit model.
    ///
    /// Errors only on malformed input. A fit that fails numerically returns
    /// parameters whose `fitting.able_to_identify` is `false`.
    pub fn identify(&self, data: &UnitDataSet) -> IdentResult<UnitParameters> {
        data.validate()?;
        self.config.validate(data.n_inputs())?;

        let n = data.len();
        let y_proc = data.process_output();
        let excl = Exclusions::new(data, &self.config.fitting);

        let max_delay = self.config.max_delay_samples.min(n.saturating_sub(3));
        tracing::debug!(max_delay, samples = n, "searching time delay");

        let mut candidates: Vec<(usize, UnitParameters)> = (0..=max_delay)
            .into_par_iter()
            .map(|delay| (delay, self.fit_with_delay(data, &y_proc, &excl, delay)))
            .collect();

        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, (_, p))| p.is_identified())
            .min_by(|(_, (_, a)), (_, (_, b))| {
                sim_objective(a.fitting.as_ref()).total_cmp(&sim_objective(b.fitting.as_ref()))
            })
            .map(|(i, _)| i);

        let Some(best) = best else {
            tracing::warn!("no delay candidate could be identified");
            return Ok(candidates
                .into_iter()
                .next()
                .map(|(_, p)| p)
                .unwrap_or_else(|| failed_params(data, 0)));
        };

        let (delay, mut params) = candidates.swap_remove(best);
        if delay == max_delay && max_delay > 0 {
            params.add_warning(ModelWarning::DelayAtSearchLimit);
        }
        tracing::info!(
            delay_samples = delay,
            objective = sim_objective(params.fitting.as_ref()),
            "identified unit model"
        );
        Ok(params)
    }

    fn fit_with_delay(
        &self,
        data: &UnitDataSet,
        y_proc: &[f64],
        excl: &Exclusions,
        delay: usize,
    ) -> UnitParameters {
        if self.config.dynamic {
            let reg = self.regress_rows(data, y_proc, excl, delay, true);
            if !reg.able_to_identify {
                return from_failed_regression(data, &reg);
            }
            let a = 1.0 + reg.params[0];
            if a.is_finite() && a < 1.0 {
                return self.finish(data, excl, delay, &reg, Some(a));
            }
            tracing::debug!(delay, a, "implausible dynamics, falling back to static fit");
            let reg = self.regress_rows(data, y_proc, excl, delay, false);
            if !reg.able_to_identify {
                return from_failed_regression(data, &reg);
            }
            let mut params = self.finish(data, excl, delay, &reg, None);
            params.add_warning(ModelWarning::TimeConstantNotIdentifiable);
            params
        } else {
            let reg = self.regress_rows(data, y_proc, excl, delay, false);
            if !reg.able_to_identify {
                return from_failed_regression(data, &reg);
            }
            self.finish(data, excl, delay, &reg, None)
        }
    }

    fn layout(&self, data: &UnitDataSet, lag: bool) -> Layout {
        Layout {
            lag,
            n_inputs: data.n_inputs(),
            curvature_inputs: self.config.curvature_inputs.clone(),
        }
    }

    /// Build and solve the regression for one delay. With `lag` the target is
    /// the one-step difference and `y[k−1]` is the first regressor.
    fn regress_rows(
        &self,
        data: &UnitDataSet,
        y_proc: &[f64],
        excl: &Exclusions,
        delay: usize,
        lag: bool,
    ) -> RegressionResult {
        let n = data.len();
        let layout = self.layout(data, lag);
        let k0 = if lag { delay.max(1) } else { delay };
        let rows = n.saturating_sub(k0);

        let y_bad = excl.output_rows(n, lag);

        let mut target = Vec::with_capacity(rows);
        let n_cols = layout.curvature_col(layout.curvature_inputs.len());
        let mut cols = vec![Vec::with_capacity(rows); n_cols];
        let mut excluded = Vec::new();

        for (r, k) in (k0..n).enumerate() {
            let ku = k - delay;
            if y_bad[k] || excl.u[ku] {
                excluded.push(r);
            }
            if lag {
                target.push(y_proc[k] - y_proc[k - 1]);
                cols[0].push(y_proc[k - 1]);
            } else {
                target.push(y_proc[k]);
            }
            for (i, col) in data.u.iter().enumerate() {
                cols[layout.input_col(i)].push(col[ku] - self.config.u0_at(i));
            }
            for (j, &i) in layout.curvature_inputs.iter().enumerate() {
                let du = data.u[i][ku] - self.config.u0_at(i);
                cols[layout.curvature_col(j)].push(du * du / self.config.u_norm_at(i));
            }
        }

        let regularized: Vec<usize> = match &self.config.regularize_inputs {
            Some(inputs) => inputs.iter().map(|&i| layout.input_col(i)).collect(),
            None => (0..data.n_inputs()).map(|i| layout.input_col(i)).collect(),
        };
        regress(
            &target,
            &cols,
            &excluded,
            Some(regularized.as_slice()),
            &self.config.regression,
        )
    }

    /// Convert regression coefficients into parameters, re-estimate the bias
    /// by simulation and score the simulated fit.
    ///
    /// `lag_coefficient` is `a` of a dynamic fit, `None` for a static one.
    fn finish(
        &self,
        data: &UnitDataSet,
        excl: &Exclusions,
        delay: usize,
        reg: &RegressionResult,
        lag_coefficient: Option<f64>,
    ) -> UnitParameters {
        let dt = data.time_base_s;
        let layout = self.layout(data, lag_coefficient.is_some());
        let a = lag_coefficient.unwrap_or(0.0);
        let scale = 1.0 - a;
        let conf = reg.param_conf.as_deref();
        let conf_at = |c: usize| conf.and_then(|v| v.get(c).copied());

        let gains: Vec<f64> = (0..data.n_inputs())
            .map(|i| reg.params[layout.input_col(i)] / scale)
            .collect();
        let mut params = UnitParameters::new(gains, 0.0).with_time_delay(delay as f64 * dt);
        params.u0 = self.config.u0.clone();
        params.u_norm = self.config.u_norm.clone();
        params.linear_gain_unc = conf.map(|_| {
            (0..data.n_inputs())
                .map(|i| conf_at(layout.input_col(i)).unwrap_or(f64::NAN) / scale)
                .collect()
        });

        if !self.config.curvature_inputs.is_empty() {
            let mut curv = vec![f64::NAN; data.n_inputs()];
            let mut curv_unc = vec![f64::NAN; data.n_inputs()];
            for (j, &i) in self.config.curvature_inputs.iter().enumerate() {
                curv[i] = reg.params[layout.curvature_col(j)] / scale;
                curv_unc[i] = conf_at(layout.curvature_col(j)).unwrap_or(f64::NAN) / scale;
            }
            params.curvatures = Some(curv);
            params.curvature_unc = conf.map(|_| curv_unc);
        }

        if a > 0.0 {
            params.time_constant_s = dt * a / scale;
            params.time_constant_unc_s = conf_at(0).map(|c| c * dt / (scale * scale));
        }

        for w in &reg.warnings {
            match w {
                RegressionWarning::RankDeficient { .. } => {
                    params.add_warning(ModelWarning::RankDeficientInputs);
                }
                RegressionWarning::ConstantColumn { index } => {
                    if let Some(i) = layout.input_of(*index) {
                        params.add_warning(ModelWarning::ConstantInput { index: i });
                    }
                }
                RegressionWarning::SolverFailed { solver, .. } => {
                    params.add_warning(ModelWarning::RegressionFailed {
                        solver: solver.clone(),
                    });
                }
            }
        }

        let bias_fallback = reg.bias / scale;
        let bias_unc = conf_at(reg.params.len() - 1).map(|c| c / scale);
        let y_sim0 = simulate_unit(&params, data);
        let residuals: Vec<f64> = (0..data.len())
            .filter(|&k| excl.output_ok(k))
            .map(|k| data.y_meas[k] - y_sim0[k])
            .filter(|r| r.is_finite())
            .collect();
        params.bias = if residuals.is_empty() {
            f64::NAN
        } else {
            residuals.iter().sum::<f64>() / residuals.len() as f64
        };
        if !params.bias.is_finite() {
            params.bias = bias_fallback;
            params.add_warning(ModelWarning::BiasReestimationFailed);
        }
        params.bias_unc = bias_unc;

        let y_sim: Vec<f64> = y_sim0.iter().map(|y| y + params.bias).collect();
        let sim = FitMetrics::compute(&data.y_meas, &y_sim, &excl.y);

        let duration = data.len() as f64 * dt;
        if params.time_constant_s > 0.0 && duration < 5.0 * params.time_constant_s {
            params.add_warning(ModelWarning::DataSetShortComparedToTimeConstant);
        }

        params.fitting = Some(FittingResult {
            able_to_identify: params.linear_gains.iter().all(|g| g.is_finite())
                && params.time_constant_s.is_finite(),
            solver_id: SOLVER_ID.to_string(),
            objective_value: reg.objective_value,
            r_squared: reg.r_squared,
            objective_value_sim: Some(sim.sse),
            r_squared_sim: Some(sim.r_squared),
            n_total: data.len(),
            n_excluded: unfitted_samples(data, reg),
        });
        params
    }
}

/// Samples of `data` that did not enter the regression, including the
/// leading samples consumed by the lag and the delay.
pub(crate) fn unfitted_samples(data: &UnitDataSet, reg: &RegressionResult) -> usize {
    let fitted = reg.n_total.saturating_sub(reg.n_excluded);
    data.len().saturating_sub(fitted)
}

/// Simulated sum of squared errors; infinite when unavailable.
pub(crate) fn sim_objective(fitting: Option<&FittingResult>) -> f64 {
    fitting
        .and_then(|f| f.objective_value_sim)
        .filter(|v| v.is_finite())
        .unwrap_or(f64::INFINITY)
}

fn failed_params(data: &UnitDataSet, n_excluded: usize) -> UnitParameters {
    let mut params = UnitParameters::new(vec![0.0; data.n_inputs()], 0.0);
    params.fitting = Some(FittingResult {
        n_total: data.len(),
        n_excluded,
        ..FittingResult::failed(SOLVER_ID)
    });
    params.add_warning(ModelWarning::RegressionFailed {
        solver: SOLVER_ID.to_string(),
    });
    params
}

fn from_failed_regression(data: &UnitDataSet, reg: &RegressionResult) -> UnitParameters {
    let reason = reg
        .warnings
        .iter()
        .find_map(|w| match w {
            RegressionWarning::SolverFailed { what, .. } => Some(what.as_str()),
            _ => None,
        })
        .unwrap_or("all parameters zero");
    tracing::debug!(reason, "regression did not identify a model");
    failed_params(data, unfitted_samples(data, reg))
}

/// Simulate `params` over the inputs of `data`, including any disturbance.
pub fn simulate_unit(params: &UnitParameters, data: &UnitDataSet) -> Vec<f64> {
    simulate_model(&mut UnitModel::new("identification", params.clone()), data)
}

/// Drive `model` through every sample of `data` and collect its output.
pub(crate) fn simulate_model(model: &mut impl SimulatableModel, data: &UnitDataSet) -> Vec<f64> {
    let mut diag = Diagnostics::new();
    (0..data.len())
        .map(|k| {
            model
                .iterate(&data.input_row(k), data.time_base_s, data.bad_value, &mut diag)
                .y
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitting_specs_exclude_out_of_range_samples() {
        let data = UnitDataSet::new(
            vec![0.0, 5.0, 10.0, 2.0],
            vec![vec![1.0, 1.0, 1.0, 9.0]],
            1.0,
        );
        let specs = FittingSpecs {
            y_max_fit: Some(8.0),
            u_max_fit: Some(vec![5.0]),
            ..FittingSpecs::default()
        };
        assert_eq!(specs.excluded_indices(&data), vec![2, 3]);

        let no_limit = FittingSpecs {
            u_min_fit: Some(vec![f64::NAN]),
            ..FittingSpecs::default()
        };
        assert!(no_limit.excluded_indices(&data).is_empty());
    }

    #[test]
    fn dataset_validation() {
        let ok = UnitDataSet::new(vec![0.0; 5], vec![vec![0.0; 5]], 1.0);
        assert!(ok.validate().is_ok());
        let short = UnitDataSet::new(vec![0.0; 5], vec![vec![0.0; 4]], 1.0);
        assert!(matches!(short.validate(), Err(IdentError::ProblemSetup { .. })));
        let no_dt = UnitDataSet::new(vec![0.0; 5], vec![vec![0.0; 5]], 0.0);
        assert!(no_dt.validate().is_err());
    }

    #[test]
    fn disturbance_is_appended_to_input_row() {
        let data = UnitDataSet::new(vec![0.0; 3], vec![vec![1.0, 2.0, 3.0]], 1.0)
            .with_disturbance(vec![0.5, 0.5, 0.5]);
        assert_eq!(data.input_row(1), vec![2.0, 0.5]);
        assert_eq!(data.process_output(), vec![-0.5, -0.5, -0.5]);
    }

    #[test]
    fn layout_maps_columns_to_inputs() {
        let layout = Layout {
            lag: true,
            n_inputs: 2,
            curvature_inputs: vec![1],
        };
        assert_eq!(layout.input_of(0), None);
        assert_eq!(layout.input_of(1), Some(0));
        assert_eq!(layout.input_of(2), Some(1));
        assert_eq!(layout.input_of(3), Some(1));
    }

    #[test]
    fn config_rejects_bad_indices() {
        let config = IdentifierConfig {
            curvature_inputs: vec![3],
            ..IdentifierConfig::default()
        };
        assert!(config.validate(2).is_err());
        let config = IdentifierConfig {
            u0: Some(vec![0.0]),
            ..IdentifierConfig::default()
        };
        assert!(config.validate(2).is_err());
    }
}
