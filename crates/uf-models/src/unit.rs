//! First-order-plus-delay unit model with optional curvature.

use uf_core::{DEFAULT_BAD_VALUE, Diagnostics, is_usable_sample};

use crate::dynamics::DynamicsStage;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelKind, SimulatableModel};
use crate::output::ModelOutput;
use crate::params::{UnitParameters, clamp_output};
use crate::steady_state::{SteadyStateEngine, additive_part, evaluate, invert_input};

/// Simulatable unit process.
///
/// Each step: hold-last-good on bad inputs, static value, low-pass at the
/// time constant, delay line, then additive disturbances and clamping.
#[derive(Debug, Clone)]
pub struct UnitModel {
    id: String,
    params: UnitParameters,
    engine: SteadyStateEngine,
    dynamics: DynamicsStage,
}

impl UnitModel {
    pub fn new(id: impl Into<String>, params: UnitParameters) -> Self {
        let engine = SteadyStateEngine::new(params.num_inputs());
        Self {
            id: id.into(),
            params,
            engine,
            dynamics: DynamicsStage::new(),
        }
    }

    pub fn params(&self) -> &UnitParameters {
        &self.params
    }

    /// Replace the parameters and clear all state.
    pub fn set_params(&mut self, params: UnitParameters) {
        self.engine = SteadyStateEngine::new(params.num_inputs());
        self.dynamics.reset();
        self.params = params;
    }

    /// No lag and no delay.
    pub fn is_static(&self) -> bool {
        self.params.time_constant_s == 0.0 && self.params.time_delay_s == 0.0
    }
}

impl SimulatableModel for UnitModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Unit
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
        if self.params.linear_gains.is_empty() {
            diagnostics.error(&self.id, "no linear gains configured");
            return ModelOutput::nan();
        }
        let n = self.input_arity();
        if inputs.len() < n {
            diagnostics.error(
                &self.id,
                format!("expected {n} inputs, got {}", inputs.len()),
            );
            return ModelOutput::nan();
        }

        let value = self
            .engine
            .compute(&self.params.input_terms(), self.params.bias, inputs, bad_value);
        let process = self.dynamics.step(
            value.process,
            self.params.time_constant_s,
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
        let value = evaluate(
            &self.params.input_terms(),
            self.params.bias,
            &cleaned,
            additive_part(inputs, n),
        );
        let y = value.total();
        y.is_finite().then_some(y)
    }

    fn steady_state_input(&self, y0: f64, input_index: usize, inputs: &[f64]) -> ModelResult<f64> {
        let terms = self.params.input_terms();
        let n = terms.len();
        if input_index >= n {
            return Err(ModelError::InvalidArg {
                what: "input index outside model inputs",
            });
        }
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
        invert_input(&terms, input_index, y0 - known)
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
    use crate::fitting::FittingResult;

    const BAD: f64 = DEFAULT_BAD_VALUE;

    fn run(model: &mut UnitModel, inputs: &[f64], dt: f64) -> ModelOutput {
        let mut diag = Diagnostics::new();
        model.iterate(inputs, dt, BAD, &mut diag)
    }

    #[test]
    fn static_output_matches_linear_sum() {
        let p = UnitParameters::new(vec![2.0, -1.0], 0.5).with_operating_point(vec![1.0, 0.0]);
        let mut model = UnitModel::new("tank", p);
        assert!(model.is_static());
        let out = run(&mut model, &[3.0, 2.0], 1.0);
        assert_eq!(out.y, 0.5 + 2.0 * 2.0 - 2.0);
        assert_eq!(out.y_internal, None);
    }

    #[test]
    fn additive_input_reports_internal_value() {
        let p = UnitParameters::new(vec![1.0], 0.0).with_time_constant(5.0);
        let mut model = UnitModel::new("tank", p);
        let out = run(&mut model, &[2.0, 10.0], 1.0);
        assert_eq!(out.y, 12.0);
        assert_eq!(out.y_internal, Some(2.0));
    }

    #[test]
    fn not_identified_yields_nan_and_error() {
        let mut p = UnitParameters::new(vec![1.0], 0.0);
        p.fitting = Some(FittingResult::failed("svd"));
        let mut model = UnitModel::new("bad", p);
        let mut diag = Diagnostics::new();
        let out = model.iterate(&[1.0], 1.0, BAD, &mut diag);
        assert!(out.y.is_nan());
        assert!(diag.has_errors());
        assert!(!model.is_simulatable().0);
    }

    #[test]
    fn missing_gains_yield_nan_and_error() {
        let mut model = UnitModel::new("empty", UnitParameters::default());
        let mut diag = Diagnostics::new();
        let out = model.iterate(&[1.0], 1.0, BAD, &mut diag);
        assert!(out.y.is_nan());
        assert_eq!(out.y_internal, None);
        assert!(diag.has_errors());
        assert!(!model.is_simulatable().0);
    }

    #[test]
    fn output_is_clamped() {
        let p = UnitParameters::new(vec![1.0], 0.0).with_output_limits(Some(0.0), Some(5.0));
        let mut model = UnitModel::new("c", p);
        assert_eq!(run(&mut model, &[10.0], 1.0).y, 5.0);
        assert_eq!(run(&mut model, &[-10.0], 1.0).y, 0.0);
    }

    #[test]
    fn bad_sample_holds_previous_value() {
        let p = UnitParameters::new(vec![3.0], 0.0);
        let mut model = UnitModel::new("h", p);
        assert_eq!(run(&mut model, &[1.0], 1.0).y, 3.0);
        assert_eq!(run(&mut model, &[BAD], 1.0).y, 3.0);
        assert_eq!(run(&mut model, &[f64::NAN], 1.0).y, 3.0);
    }

    #[test]
    fn steady_state_output_does_not_mutate() {
        let p = UnitParameters::new(vec![2.0], 1.0).with_time_constant(10.0);
        let mut model = UnitModel::new("s", p);
        run(&mut model, &[1.0], 1.0);
        assert_eq!(model.steady_state_output(&[4.0], BAD), Some(9.0));
        assert_eq!(model.steady_state_output(&[BAD], BAD), Some(3.0));
        // state still at u = 1
        assert_eq!(run(&mut model, &[1.0], 1.0).y, 3.0);
    }

    #[test]
    fn steady_state_input_inverts_output() {
        let p = UnitParameters::new(vec![2.0, 0.5], 1.0).with_operating_point(vec![1.0, 0.0]);
        let model = UnitModel::new("inv", p);
        let u = [3.0, 4.0, 0.5];
        let y0 = model.steady_state_output(&u, BAD).unwrap();
        let u0 = model.steady_state_input(y0, 0, &[f64::NAN, 4.0, 0.5]).unwrap();
        assert!((u0 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn warm_start_begins_at_steady_state() {
        let p = UnitParameters::new(vec![1.0], 0.0)
            .with_time_constant(10.0)
            .with_time_delay(3.0);
        let mut model = UnitModel::new("w", p);
        for _ in 0..20 {
            run(&mut model, &[0.0], 1.0);
        }
        model.warm_start(&[5.0], 5.0);
        assert_eq!(run(&mut model, &[5.0], 1.0).y, 5.0);
        assert_eq!(run(&mut model, &[5.0], 1.0).y, 5.0);
    }

    #[test]
    fn too_few_inputs_is_an_error() {
        let mut model = UnitModel::new("n", UnitParameters::new(vec![1.0, 1.0], 0.0));
        let mut diag = Diagnostics::new();
        assert!(model.iterate(&[1.0], 1.0, BAD, &mut diag).y.is_nan());
        assert_eq!(diag.for_source("n").count(), 1);
    }
}
