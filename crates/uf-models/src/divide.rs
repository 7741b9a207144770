//! Two-input division block.

use serde::{Deserialize, Serialize};
use uf_core::{DEFAULT_BAD_VALUE, Diagnostics, is_usable_sample};

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelKind, SimulatableModel};
use crate::output::ModelOutput;
use crate::params::{check_limits, clamp_output};

fn default_nan_value() -> f64 {
    DEFAULT_BAD_VALUE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivideParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
    /// Input value treated as missing, in addition to the caller's bad value.
    #[serde(default = "default_nan_value")]
    pub nan_value_in: f64,
    /// Output emitted when the quotient is undefined.
    #[serde(default = "default_nan_value")]
    pub nan_value_out: f64,
}

impl Default for DivideParameters {
    fn default() -> Self {
        Self {
            y_min: None,
            y_max: None,
            nan_value_in: DEFAULT_BAD_VALUE,
            nan_value_out: DEFAULT_BAD_VALUE,
        }
    }
}

/// `y = clamp(u[0] / u[1])`.
#[derive(Debug, Clone)]
pub struct Divide {
    id: String,
    params: DivideParameters,
}

impl Divide {
    pub fn new(id: impl Into<String>, params: DivideParameters) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }

    pub fn params(&self) -> &DivideParameters {
        &self.params
    }

    fn usable(&self, v: f64, bad_value: f64) -> bool {
        is_usable_sample(v, bad_value) && v != self.params.nan_value_in
    }

    fn quotient(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        let [x, y] = inputs else {
            return None;
        };
        if !self.usable(*x, bad_value) || !self.usable(*y, bad_value) || *y == 0.0 {
            return None;
        }
        let q = x / y;
        q.is_finite()
            .then(|| clamp_output(q, self.params.y_min, self.params.y_max))
    }
}

impl SimulatableModel for Divide {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Divide
    }

    fn input_arity(&self) -> usize {
        2
    }

    fn validate(&self) -> ModelResult<()> {
        check_limits(self.params.y_min, self.params.y_max)
    }

    fn iterate(
        &mut self,
        inputs: &[f64],
        _dt_s: f64,
        bad_value: f64,
        diagnostics: &mut Diagnostics,
    ) -> ModelOutput {
        if inputs.len() != 2 {
            diagnostics.warn(
                &self.id,
                format!("divide expects 2 inputs, got {}", inputs.len()),
            );
        }
        ModelOutput::scalar(
            self.quotient(inputs, bad_value)
                .unwrap_or(self.params.nan_value_out),
        )
    }

    fn steady_state_output(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        self.quotient(inputs, bad_value)
    }

    fn steady_state_input(&self, y0: f64, input_index: usize, inputs: &[f64]) -> ModelResult<f64> {
        let other = match input_index {
            0 => inputs.get(1),
            1 => inputs.first(),
            _ => {
                return Err(ModelError::InvalidArg {
                    what: "divide has two inputs",
                });
            }
        }
        .copied()
        .filter(|v| self.usable(*v, DEFAULT_BAD_VALUE))
        .ok_or_else(|| ModelError::NotInvertible {
            what: "the other divide input has no usable value".to_string(),
        })?;

        let u = if input_index == 0 { y0 * other } else { other / y0 };
        if u.is_finite() {
            Ok(u)
        } else {
            Err(ModelError::NotInvertible {
                what: format!("no finite value of input {input_index} gives {y0}"),
            })
        }
    }

    fn warm_start(&mut self, _inputs: &[f64], _output: f64) {}
}
