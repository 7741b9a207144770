//! Gain-scheduled first-order unit.
//!
//! Gains and time constants are piecewise constant in one scheduling input.
//! With thresholds `t`, entry 0 applies for `v < t[0]`, entry `i` for
//! `t[i-1] <= v < t[i]` and the last entry for `v >= t[last]`.

use serde::{Deserialize, Serialize};
use uf_core::{DEFAULT_BAD_VALUE, Diagnostics, WarningList, is_usable_sample};

use crate::dynamics::DynamicsStage;
use crate::error::{ModelError, ModelResult};
use crate::fitting::{FittingResult, ModelWarning};
use crate::model::{ModelKind, SimulatableModel};
use crate::output::ModelOutput;
use crate::params::{check_limits, clamp_output};
use crate::steady_state::{InputTerms, SteadyStateEngine, additive_part, evaluate, invert_input};

/// Index of the schedule entry that applies at `value`.
pub fn schedule_index(thresholds: &[f64], value: f64) -> usize {
    thresholds.partition_point(|t| *t <= value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainSchedParameters {
    /// One gain vector per schedule region.
    pub linear_gains: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_gain_thresholds: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_gain_unc: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub time_constants_s: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_constant_thresholds: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_constant_unc_s: Option<Vec<f64>>,
    /// Which input drives the schedule.
    #[serde(default)]
    pub sched_input_index: usize,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub time_delay_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitting: Option<FittingResult>,
    #[serde(default, skip_serializing_if = "WarningList::is_empty")]
    pub warnings: WarningList<ModelWarning>,
}

impl GainSchedParameters {
    /// Single-region schedule.
    pub fn new(linear_gains: Vec<f64>, bias: f64) -> Self {
        Self {
            linear_gains: vec![linear_gains],
            linear_gain_thresholds: None,
            linear_gain_unc: None,
            time_constants_s: Vec::new(),
            time_constant_thresholds: None,
            time_constant_unc_s: None,
            sched_input_index: 0,
            bias,
            time_delay_s: 0.0,
            y_min: None,
            y_max: None,
            fitting: None,
            warnings: WarningList::new(),
        }
    }

    pub fn with_gain_schedule(mut self, gains: Vec<Vec<f64>>, thresholds: Vec<f64>) -> Self {
        self.linear_gains = gains;
        self.linear_gain_thresholds = Some(thresholds);
        self
    }

    pub fn with_time_constant_schedule(mut self, time_constants_s: Vec<f64>, thresholds: Vec<f64>) -> Self {
        self.time_constants_s = time_constants_s;
        self.time_constant_thresholds = Some(thresholds);
        self
    }

    pub fn with_sched_input(mut self, index: usize) -> Self {
        self.sched_input_index = index;
        self
    }

    pub fn with_time_delay(mut self, time_delay_s: f64) -> Self {
        self.time_delay_s = time_delay_s;
        self
    }

    /// Record a warning once; repeats are ignored.
    pub fn add_warning(&mut self, warning: ModelWarning) {
        self.warnings.push(warning);
    }

    pub fn num_inputs(&self) -> usize {
        self.linear_gains.first().map_or(0, Vec::len)
    }

    fn gain_thresholds(&self) -> &[f64] {
        self.linear_gain_thresholds.as_deref().unwrap_or(&[])
    }

    fn time_constant_thresholds(&self) -> &[f64] {
        self.time_constant_thresholds.as_deref().unwrap_or(&[])
    }

    /// Index into `linear_gains` for scheduling value `value`.
    pub fn gain_index(&self, value: f64) -> usize {
        let last = self.linear_gains.len().saturating_sub(1);
        schedule_index(self.gain_thresholds(), value).min(last)
    }

    pub fn gains_for(&self, value: f64) -> Option<&[f64]> {
        self.linear_gains
            .get(self.gain_index(value))
            .map(Vec::as_slice)
    }

    /// Time constant for scheduling value `value`; zero when none configured.
    pub fn time_constant(&self, value: f64) -> f64 {
        if self.time_constants_s.is_empty() {
            return 0.0;
        }
        let last = self.time_constants_s.len() - 1;
        let i = schedule_index(self.time_constant_thresholds(), value).min(last);
        self.time_constants_s[i]
    }

    pub fn is_identified(&self) -> bool {
        self.fitting.as_ref().is_none_or(|f| f.able_to_identify)
    }

    pub fn validate(&self) -> ModelResult<()> {
        let n = self.num_inputs();
        if n == 0 {
            return Err(ModelError::InvalidArg {
                what: "linear_gains must hold at least one non-empty gain vector",
            });
        }
        if self.linear_gains.iter().any(|g| g.len() != n) {
            return Err(ModelError::ConfigurationMismatch {
                what: "all gain vectors must have the same length".to_string(),
            });
        }
        check_schedule("linear_gains", self.linear_gains.len(), self.gain_thresholds())?;
        if !self.time_constants_s.is_empty() || !self.time_constant_thresholds().is_empty() {
            check_schedule(
                "time_constants_s",
                self.time_constants_s.len(),
                self.time_constant_thresholds(),
            )?;
        }
        if self
            .time_constants_s
            .iter()
            .any(|t| !(t.is_finite() && *t >= 0.0))
        {
            return Err(ModelError::InvalidArg {
                what: "time constants must be finite and non-negative",
            });
        }
        if !(self.time_delay_s.is_finite() && self.time_delay_s >= 0.0) {
            return Err(ModelError::InvalidArg {
                what: "time delay must be finite and non-negative",
            });
        }
        if self.sched_input_index >= n {
            return Err(ModelError::ConfigurationMismatch {
                what: format!(
                    "scheduling input {} outside {n} model inputs",
                    self.sched_input_index
                ),
            });
        }
        check_limits(self.y_min, self.y_max)
    }
}

fn check_schedule(name: &str, entries: usize, thresholds: &[f64]) -> ModelResult<()> {
    if thresholds.is_empty() {
        if entries > 1 {
            return Err(ModelError::ConfigurationMismatch {
                what: format!("{name} has {entries} entries but no thresholds"),
            });
        }
        return Ok(());
    }
    if thresholds.len() + 1 != entries {
        return Err(ModelError::ConfigurationMismatch {
            what: format!(
                "{name} has {entries} entries and {} thresholds",
                thresholds.len()
            ),
        });
    }
    let ascending = thresholds.iter().all(|t| t.is_finite())
        && thresholds.windows(2).all(|w| w[0] < w[1]);
    if !ascending {
        return Err(ModelError::ConfigurationMismatch {
            what: format!("{name} thresholds must be finite and ascending"),
        });
    }
    Ok(())
}

/// Simulatable gain-scheduled unit.
#[derive(Debug, Clone)]
pub struct GainSchedModel {
    id: String,
    params: GainSchedParameters,
    engine: SteadyStateEngine,
    dynamics: DynamicsStage,
}

impl GainSchedModel {
    pub fn new(id: impl Into<String>, params: GainSchedParameters) -> Self {
        let engine = SteadyStateEngine::new(params.num_inputs());
        Self {
            id: id.into(),
            params,
            engine,
            dynamics: DynamicsStage::new(),
        }
    }

    pub fn params(&self) -> &GainSchedParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: GainSchedParameters) {
        self.engine = SteadyStateEngine::new(params.num_inputs());
        self.dynamics.reset();
        self.params = params;
    }
}

impl SimulatableModel for GainSchedModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::GainSched
    }

    fn input_arity(&self) -> usize {
        self.params.num_inputs()
    }

    fn validate(&self) -> ModelResult<()> {
        self.params.validate()?;
        if !self.params.is_identified() {
            return Err(ModelError::NotIdentified {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn iterate(
        &mut self,
        inputs: &[f64],
        dt_s: f64,
        bad_value: f64,
        diagnostics: &mut Diagnostics,
    ) -> ModelOutput {
        if !self.params.is_identified() {
            tracing::warn!(model = %self.id, "iterating a model that was not identified");
            let err = ModelError::NotIdentified {
                id: self.id.clone(),
            };
            diagnostics.error(&self.id, err.to_string());
            return ModelOutput::nan();
        }
        let n = self.input_arity();
        if inputs.len() < n || self.params.sched_input_index >= n {
            diagnostics.error(
                &self.id,
                format!("expected {n} inputs, got {}", inputs.len()),
            );
            return ModelOutput::nan();
        }

        let cleaned = self.engine.hold_last_good(inputs, n, bad_value);
        let sched = cleaned[self.params.sched_input_index];
        let Some(gains) = self.params.gains_for(sched) else {
            return ModelOutput::nan();
        };
        let value = evaluate(
            &InputTerms::linear(gains),
            self.params.bias,
            &cleaned,
            additive_part(inputs, n),
        );
        let process = self.dynamics.step(
            value.process,
            self.params.time_constant(sched),
            self.params.time_delay_s,
            dt_s,
        );

        let y = clamp_output(process + value.additive, self.params.y_min, self.params.y_max);
        ModelOutput {
            y,
            y_internal: (inputs.len() > n).then_some(process),
        }
    }

    fn steady_state_output(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        let n = self.input_arity();
        if n == 0 || inputs.len() < n || !self.params.is_identified() {
            return None;
        }
        let cleaned = self.engine.peek(inputs, n, bad_value);
        let sched = *cleaned.get(self.params.sched_input_index)?;
        let gains = self.params.gains_for(sched)?;
        let y = evaluate(
            &InputTerms::linear(gains),
            self.params.bias,
            &cleaned,
            additive_part(inputs, n),
        )
        .total();
        y.is_finite().then_some(y)
    }

    /// Tries each schedule region and returns the first solution that falls
    /// in the region it was computed with.
    fn steady_state_input(&self, y0: f64, input_index: usize, inputs: &[f64]) -> ModelResult<f64> {
        let n = self.input_arity();
        if input_index >= n {
            return Err(ModelError::InvalidArg {
                what: "input index outside model inputs",
            });
        }
        let sched_index = self.params.sched_input_index;
        let fixed_sched = (input_index != sched_index)
            .then(|| inputs.get(sched_index).copied())
            .flatten();
        if input_index != sched_index
            && !fixed_sched.is_some_and(|v| is_usable_sample(v, DEFAULT_BAD_VALUE))
        {
            return Err(ModelError::NotInvertible {
                what: format!("scheduling input {sched_index} has no usable value"),
            });
        }

        let mut last_err = None;
        for (region, gains) in self.params.linear_gains.iter().enumerate() {
            let terms = InputTerms::linear(gains);
            let known = inputs
                .iter()
                .enumerate()
                .filter(|&(i, u)| i != input_index && is_usable_sample(*u, DEFAULT_BAD_VALUE))
                .fold(self.params.bias, |acc, (i, &u)| {
                    if i < n {
                        acc + terms.contribution(i, u)
                    } else {
                        acc + u
                    }
                });
            match invert_input(&terms, input_index, y0 - known) {
                Ok(u) => {
                    let v = fixed_sched.unwrap_or(u);
                    if self.params.gain_index(v) == region {
                        return Ok(u);
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ModelError::NotInvertible {
            what: "no schedule region is consistent with the requested output".to_string(),
        }))
    }

    fn warm_start(&mut self, inputs: &[f64], output: f64) {
        tracing::debug!(model = %self.id, output, "warm start");
        self.dynamics.reset();
        self.engine.reset();
        self.engine.seed(inputs, DEFAULT_BAD_VALUE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_region() -> GainSchedParameters {
        GainSchedParameters::new(vec![1.0], 0.0).with_gain_schedule(vec![vec![1.0], vec![3.0]], vec![2.0])
    }

    #[test]
    fn threshold_belongs_to_upper_region() {
        let p = two_region();
        assert_eq!(p.gain_index(1.999), 0);
        assert_eq!(p.gain_index(2.0), 1);
        assert_eq!(p.gain_index(2.001), 1);
    }

    #[test]
    fn three_regions_half_open() {
        let p = GainSchedParameters::new(vec![0.0], 0.0)
            .with_gain_schedule(vec![vec![1.0], vec![2.0], vec![3.0]], vec![0.0, 10.0]);
        assert_eq!(p.gains_for(-5.0), Some(&[1.0][..]));
        assert_eq!(p.gains_for(0.0), Some(&[2.0][..]));
        assert_eq!(p.gains_for(9.99), Some(&[2.0][..]));
        assert_eq!(p.gains_for(10.0), Some(&[3.0][..]));
        assert_eq!(p.gains_for(1e9), Some(&[3.0][..]));
    }

    #[test]
    fn time_constant_lookup_is_independent() {
        let p = two_region().with_time_constant_schedule(vec![5.0, 20.0, 50.0], vec![1.0, 3.0]);
        assert!(p.validate().is_ok());
        assert_eq!(p.time_constant(0.0), 5.0);
        assert_eq!(p.time_constant(2.0), 20.0);
        assert_eq!(p.time_constant(3.0), 50.0);
        assert_eq!(GainSchedParameters::new(vec![1.0], 0.0).time_constant(1.0), 0.0);
    }

    #[test]
    fn invalid_schedules() {
        let mut p = two_region();
        p.linear_gain_thresholds = None;
        assert!(p.validate().is_err());

        let p = GainSchedParameters::new(vec![1.0], 0.0)
            .with_gain_schedule(vec![vec![1.0], vec![2.0], vec![3.0]], vec![5.0, 1.0]);
        assert!(p.validate().is_err());

        let p = two_region().with_sched_input(1);
        assert!(p.validate().is_err());

        let p = two_region().with_time_constant_schedule(vec![1.0, 2.0], vec![]);
        assert!(p.validate().is_err());

        let mut p = two_region();
        p.time_constant_thresholds = Some(vec![1.0, 2.0]);
        assert!(p.time_constants_s.is_empty());
        assert!(p.validate().is_err());
    }

    #[test]
    fn warm_start_begins_at_steady_state() {
        let p = two_region()
            .with_time_constant_schedule(vec![10.0], vec![])
            .with_time_delay(3.0);
        let mut model = GainSchedModel::new("gs", p);
        let mut diag = Diagnostics::new();
        for _ in 0..20 {
            model.iterate(&[0.0], 1.0, DEFAULT_BAD_VALUE, &mut diag);
        }
        let y0 = model.steady_state_output(&[5.0], DEFAULT_BAD_VALUE).unwrap();
        assert_eq!(y0, 15.0);
        model.warm_start(&[5.0], y0);
        for _ in 0..3 {
            let y = model.iterate(&[5.0], 1.0, DEFAULT_BAD_VALUE, &mut diag).y;
            assert_eq!(y, 15.0);
        }
        assert!(diag.is_empty());
    }

    #[test]
    fn iterate_switches_gain_on_threshold() {
        let mut model = GainSchedModel::new("gs", two_region());
        let mut diag = Diagnostics::new();
        let y = model.iterate(&[1.0], 1.0, DEFAULT_BAD_VALUE, &mut diag).y;
        assert_eq!(y, 1.0);
        let y = model.iterate(&[2.0], 1.0, DEFAULT_BAD_VALUE, &mut diag).y;
        assert_eq!(y, 6.0);
    }

    #[test]
    fn inversion_picks_consistent_region() {
        let model = GainSchedModel::new("gs", two_region());
        // y = 9 only reachable in the upper region: u = 3
        let u = model.steady_state_input(9.0, 0, &[0.0]).unwrap();
        assert!((u - 3.0).abs() < 1e-12);
        // y = 1 in the lower region: u = 1
        let u = model.steady_state_input(1.0, 0, &[0.0]).unwrap();
        assert!((u - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inversion_with_fixed_scheduling_input() {
        let p = GainSchedParameters::new(vec![1.0, 0.0], 0.0)
            .with_gain_schedule(vec![vec![1.0, 0.0], vec![2.0, 0.0]], vec![5.0])
            .with_sched_input(1);
        let model = GainSchedModel::new("gs", p);
        let u = model.steady_state_input(8.0, 0, &[0.0, 6.0]).unwrap();
        assert!((u - 4.0).abs() < 1e-12);
    }
}
