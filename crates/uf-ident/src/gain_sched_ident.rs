//! Identification of [`GainSchedParameters`] over scheduling thresholds.
//!
//! Regions share bias, time constant and delay; each region has its own gain
//! vector. Regressor column `(r, i)` holds `u_i[k−d]` on samples whose
//! scheduling value falls in region `r` and zero elsewhere, so one regression
//! fits every region at once:
//!
//! `y[k] − y[k−1] = (a−1)·y[k−1] + Σ_r Σ_i b_ri·u_i[k−d]·[v[k−d] ∈ r] + q`
//!
//! When the thresholds are not known, [`GainSchedIdentifier::identify_best`]
//! fits a set of candidate thresholds in parallel and keeps the one whose
//! simulated output matches the measurement best.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uf_models::{FittingResult, GainSchedModel, GainSchedParameters, ModelWarning, schedule_index};

use crate::error::{IdentError, IdentResult};
use crate::metrics::FitMetrics;
use crate::regression::{RegressionConfig, RegressionResult, RegressionWarning, SOLVER_ID, regress};
use crate::unit_ident::{
    Exclusions, FittingSpecs, UnitDataSet, sim_objective, simulate_model, unfitted_samples,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSchedIdentConfig {
    /// Ascending thresholds on the scheduling input; `n` thresholds give
    /// `n + 1` gain regions.
    pub gain_thresholds: Vec<f64>,
    pub sched_input_index: usize,
    /// Fit a time constant; `false` gives a static model.
    pub dynamic: bool,
    pub time_delay_samples: usize,
    pub fitting: FittingSpecs,
    pub regression: RegressionConfig,
}

impl Default for GainSchedIdentConfig {
    fn default() -> Self {
        Self {
            gain_thresholds: Vec::new(),
            sched_input_index: 0,
            dynamic: true,
            time_delay_samples: 0,
            fitting: FittingSpecs::default(),
            regression: RegressionConfig::default(),
        }
    }
}

impl GainSchedIdentConfig {
    fn validate(&self, n_inputs: usize) -> IdentResult<()> {
        if self.sched_input_index >= n_inputs {
            return Err(IdentError::ProblemSetup {
                what: format!(
                    "scheduling input {} outside {n_inputs} inputs",
                    self.sched_input_index
                ),
            });
        }
        check_thresholds(&self.gain_thresholds)
    }
}

fn check_thresholds(thresholds: &[f64]) -> IdentResult<()> {
    let ascending = thresholds.iter().all(|t| t.is_finite())
        && thresholds.windows(2).all(|w| w[0] < w[1]);
    if ascending {
        Ok(())
    } else {
        Err(IdentError::ProblemSetup {
            what: format!("thresholds {thresholds:?} must be finite and strictly ascending"),
        })
    }
}

/// Regressor layout: `[lag?] region 0 inputs.. region 1 inputs.. ..`.
struct Columns {
    lag: bool,
    n_inputs: usize,
    n_regions: usize,
}

impl Columns {
    fn gain_col(&self, region: usize, input: usize) -> usize {
        usize::from(self.lag) + region * self.n_inputs + input
    }

    fn len(&self) -> usize {
        self.gain_col(self.n_regions, 0)
    }

    /// `(region, input)` of a gain column.
    fn locate(&self, col: usize) -> Option<(usize, usize)> {
        let k = col.checked_sub(usize::from(self.lag))?;
        let region = k / self.n_inputs;
        (region < self.n_regions).then_some((region, k % self.n_inputs))
    }
}

/// One regression over a threshold set, with the fitted samples per region.
struct RegionFit {
    reg: RegressionResult,
    samples_per_region: Vec<usize>,
}

/// Fits gain-scheduled models.
#[derive(Debug, Clone, Default)]
pub struct GainSchedIdentifier {
    config: GainSchedIdentConfig,
}

impl GainSchedIdentifier {
    pub fn new(config: GainSchedIdentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GainSchedIdentConfig {
        &self.config
    }

    /// Identify a gain-scheduled model over the configured thresholds.
    ///
    /// Errors only on malformed input; a failed fit is reported through
    /// `fitting.able_to_identify`.
    pub fn identify(&self, data: &UnitDataSet) -> IdentResult<GainSchedParameters> {
        data.validate()?;
        self.config.validate(data.n_inputs())?;
        let y_proc = data.process_output();
        let excl = Exclusions::new(data, &self.config.fitting);
        Ok(self.fit(data, &y_proc, &excl, &self.config.gain_thresholds))
    }

    /// Identify over each candidate threshold set and keep the best simulated
    /// fit. The configured `gain_thresholds` are ignored.
    pub fn identify_best(
        &self,
        data: &UnitDataSet,
        candidates: &[Vec<f64>],
    ) -> IdentResult<GainSchedParameters> {
        data.validate()?;
        self.config.validate(data.n_inputs())?;
        if candidates.is_empty() {
            return Err(IdentError::ProblemSetup {
                what: "no candidate thresholds".to_string(),
            });
        }
        for thresholds in candidates {
            check_thresholds(thresholds)?;
        }
        let y_proc = data.process_output();
        let excl = Exclusions::new(data, &self.config.fitting);

        let mut fits: Vec<GainSchedParameters> = candidates
            .par_iter()
            .map(|thresholds| self.fit(data, &y_proc, &excl, thresholds))
            .collect();

        let best = fits
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_identified())
            .min_by(|(_, a), (_, b)| {
                sim_objective(a.fitting.as_ref()).total_cmp(&sim_objective(b.fitting.as_ref()))
            })
            .map(|(i, _)| i);

        let index = match best {
            Some(i) => i,
            None => {
                tracing::warn!("no threshold candidate could be identified");
                0
            }
        };
        let params = fits.swap_remove(index);
        tracing::info!(
            thresholds = ?params.linear_gain_thresholds,
            objective = sim_objective(params.fitting.as_ref()),
            "identified gain-scheduled model"
        );
        Ok(params)
    }

    fn fit(
        &self,
        data: &UnitDataSet,
        y_proc: &[f64],
        excl: &Exclusions,
        thresholds: &[f64],
    ) -> GainSchedParameters {
        let regions: Vec<usize> = data.u[self.config.sched_input_index]
            .iter()
            .map(|&v| schedule_index(thresholds, v))
            .collect();

        if self.config.dynamic {
            let fit = self.regress_rows(data, y_proc, excl, thresholds, &regions, true);
            if !fit.reg.able_to_identify {
                return failed_params(data, thresholds, unfitted_samples(data, &fit.reg));
            }
            let a = 1.0 + fit.reg.params[0];
            if a.is_finite() && a < 1.0 {
                return self.finish(data, excl, thresholds, &fit, Some(a));
            }
            tracing::debug!(a, "implausible dynamics, falling back to static fit");
        }

        let fit = self.regress_rows(data, y_proc, excl, thresholds, &regions, false);
        if !fit.reg.able_to_identify {
            return failed_params(data, thresholds, unfitted_samples(data, &fit.reg));
        }
        let mut params = self.finish(data, excl, thresholds, &fit, None);
        if self.config.dynamic {
            params.add_warning(ModelWarning::TimeConstantNotIdentifiable);
        }
        params
    }

    fn regress_rows(
        &self,
        data: &UnitDataSet,
        y_proc: &[f64],
        excl: &Exclusions,
        thresholds: &[f64],
        regions: &[usize],
        lag: bool,
    ) -> RegionFit {
        let n = data.len();
        let delay = self.config.time_delay_samples;
        let columns = Columns {
            lag,
            n_inputs: data.n_inputs(),
            n_regions: thresholds.len() + 1,
        };
        let k0 = if lag { delay.max(1) } else { delay };
        let rows = n.saturating_sub(k0);
        let y_bad = excl.output_rows(n, lag);

        let mut target = Vec::with_capacity(rows);
        let mut cols = vec![Vec::with_capacity(rows); columns.len()];
        let mut excluded = Vec::new();
        let mut samples_per_region = vec![0; columns.n_regions];

        for (r, k) in (k0..n).enumerate() {
            let ku = k - delay;
            let region = regions[ku];
            if y_bad[k] || excl.u[ku] {
                excluded.push(r);
            } else {
                samples_per_region[region] += 1;
            }
            if lag {
                target.push(y_proc[k] - y_proc[k - 1]);
                cols[0].push(y_proc[k - 1]);
            } else {
                target.push(y_proc[k]);
            }
            for g in 0..columns.n_regions {
                for (i, u) in data.u.iter().enumerate() {
                    let value = if g == region { u[ku] } else { 0.0 };
                    cols[columns.gain_col(g, i)].push(value);
                }
            }
        }

        let gain_cols: Vec<usize> = (usize::from(lag)..columns.len()).collect();
        let reg = regress(
            &target,
            &cols,
            &excluded,
            Some(gain_cols.as_slice()),
            &self.config.regression,
        );
        RegionFit {
            reg,
            samples_per_region,
        }
    }

    /// Convert coefficients into parameters, re-estimate the bias by
    /// simulation and score the simulated fit.
    fn finish(
        &self,
        data: &UnitDataSet,
        excl: &Exclusions,
        thresholds: &[f64],
        fit: &RegionFit,
        lag_coefficient: Option<f64>,
    ) -> GainSchedParameters {
        let reg = &fit.reg;
        let dt = data.time_base_s;
        let columns = Columns {
            lag: lag_coefficient.is_some(),
            n_inputs: data.n_inputs(),
            n_regions: thresholds.len() + 1,
        };
        let a = lag_coefficient.unwrap_or(0.0);
        let scale = 1.0 - a;
        let conf = reg.param_conf.as_deref();

        let per_region = |values: &[f64]| -> Vec<Vec<f64>> {
            (0..columns.n_regions)
                .map(|g| {
                    (0..columns.n_inputs)
                        .map(|i| values[columns.gain_col(g, i)] / scale)
                        .collect()
                })
                .collect()
        };

        let mut params = GainSchedParameters::new(Vec::new(), 0.0)
            .with_gain_schedule(per_region(reg.params.as_slice()), thresholds.to_vec())
            .with_sched_input(self.config.sched_input_index)
            .with_time_delay(self.config.time_delay_samples as f64 * dt);
        params.linear_gain_unc = conf.map(per_region);
        if a > 0.0 {
            params.time_constants_s = vec![dt * a / scale];
            params.time_constant_unc_s = conf.map(|c| vec![c[0] * dt / (scale * scale)]);
        }

        for (region, &count) in fit.samples_per_region.iter().enumerate() {
            if count == 0 {
                params.add_warning(ModelWarning::RegionWithoutData { region });
            }
        }
        for w in &reg.warnings {
            match w {
                RegressionWarning::RankDeficient { .. } => {
                    params.add_warning(ModelWarning::RankDeficientInputs);
                }
                RegressionWarning::ConstantColumn { index } => {
                    if let Some((region, input)) = columns.locate(*index)
                        && fit.samples_per_region[region] > 0
                    {
                        params.add_warning(ModelWarning::ConstantInput { index: input });
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
        let y_sim0 = simulate_model(
            &mut GainSchedModel::new("identification", params.clone()),
            data,
        );
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

        let y_sim: Vec<f64> = y_sim0.iter().map(|y| y + params.bias).collect();
        let sim = FitMetrics::compute(&data.y_meas, &y_sim, &excl.y);

        let time_constant = params.time_constants_s.first().copied().unwrap_or(0.0);
        if time_constant > 0.0 && (data.len() as f64 * dt) < 5.0 * time_constant {
            params.add_warning(ModelWarning::DataSetShortComparedToTimeConstant);
        }

        params.fitting = Some(FittingResult {
            able_to_identify: params.linear_gains.iter().flatten().all(|g| g.is_finite())
                && time_constant.is_finite(),
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

fn failed_params(data: &UnitDataSet, thresholds: &[f64], n_excluded: usize) -> GainSchedParameters {
    let gains = vec![vec![0.0; data.n_inputs()]; thresholds.len() + 1];
    let mut params =
        GainSchedParameters::new(Vec::new(), 0.0).with_gain_schedule(gains, thresholds.to_vec());
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

/// Simulate `params` over the inputs of `data`, including any disturbance.
pub fn simulate_gain_sched(params: &GainSchedParameters, data: &UnitDataSet) -> Vec<f64> {
    simulate_model(
        &mut GainSchedModel::new("identification", params.clone()),
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_map_back_to_region_and_input() {
        let columns = Columns {
            lag: true,
            n_inputs: 2,
            n_regions: 3,
        };
        assert_eq!(columns.len(), 7);
        assert_eq!(columns.gain_col(1, 1), 4);
        assert_eq!(columns.locate(0), None);
        assert_eq!(columns.locate(4), Some((1, 1)));
        assert_eq!(columns.locate(6), Some((2, 1)));
        assert_eq!(columns.locate(7), None);
    }

    #[test]
    fn thresholds_must_ascend() {
        assert!(check_thresholds(&[]).is_ok());
        assert!(check_thresholds(&[0.0, 1.0]).is_ok());
        assert!(check_thresholds(&[1.0, 1.0]).is_err());
        assert!(check_thresholds(&[f64::NAN]).is_err());
    }

    #[test]
    fn scheduling_index_is_checked() {
        let config = GainSchedIdentConfig {
            sched_input_index: 2,
            ..GainSchedIdentConfig::default()
        };
        assert!(config.validate(2).is_err());
        assert!(GainSchedIdentConfig::default().validate(1).is_ok());
    }
}
