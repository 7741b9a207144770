//! Minimum/maximum selector.

use serde::{Deserialize, Serialize};
use uf_core::{Diagnostics, is_usable_sample};

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelKind, SimulatableModel};
use crate::output::ModelOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectKind {
    Min,
    Max,
}

/// Picks the smallest or largest usable input.
#[derive(Debug, Clone)]
pub struct Select {
    id: String,
    kind: SelectKind,
    n_inputs: usize,
}

impl Select {
    pub fn new(id: impl Into<String>, kind: SelectKind, n_inputs: usize) -> Self {
        Self {
            id: id.into(),
            kind,
            n_inputs,
        }
    }

    pub fn select_kind(&self) -> SelectKind {
        self.kind
    }

    fn pick(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        let usable = inputs
            .iter()
            .copied()
            .filter(|v| is_usable_sample(*v, bad_value));
        match self.kind {
            SelectKind::Min => usable.reduce(f64::min),
            SelectKind::Max => usable.reduce(f64::max),
        }
    }
}

impl SimulatableModel for Select {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Select
    }

    fn input_arity(&self) -> usize {
        self.n_inputs
    }

    fn validate(&self) -> ModelResult<()> {
        if self.n_inputs == 0 {
            return Err(ModelError::InvalidArg {
                what: "select needs at least one input",
            });
        }
        Ok(())
    }

    fn iterate(
        &mut self,
        inputs: &[f64],
        _dt_s: f64,
        bad_value: f64,
        diagnostics: &mut Diagnostics,
    ) -> ModelOutput {
        match self.pick(inputs, bad_value) {
            Some(y) => ModelOutput::scalar(y),
            None => {
                diagnostics.warn(&self.id, "no usable input to select from");
                ModelOutput::nan()
            }
        }
    }

    fn steady_state_output(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        self.pick(inputs, bad_value)
    }

    fn steady_state_input(&self, _y0: f64, _input_index: usize, _inputs: &[f64]) -> ModelResult<f64> {
        Err(ModelError::NotSupported {
            what: "steady-state input of a select block",
        })
    }

    fn warm_start(&mut self, _inputs: &[f64], _output: f64) {}
}
