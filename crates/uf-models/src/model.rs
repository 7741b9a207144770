//! The contract every simulatable model fulfils, and the closed set of
//! model kinds.

use std::fmt;

use serde::{Deserialize, Serialize};
use uf_core::Diagnostics;

use crate::divide::Divide;
use crate::error::ModelResult;
use crate::gain_sched::GainSchedModel;
use crate::output::ModelOutput;
use crate::select::Select;
use crate::unit::UnitModel;

/// Kind tag of a [`ProcessModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Unit,
    GainSched,
    Divide,
    Select,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unit => "unit",
            Self::GainSched => "gain_sched",
            Self::Divide => "divide",
            Self::Select => "select",
        };
        f.write_str(name)
    }
}

/// A model that a plant simulator can step in time.
///
/// Inputs are positional. Entries past [`Self::input_arity`] are additive
/// disturbances where the model supports them.
pub trait SimulatableModel {
    fn id(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// Number of inputs the model itself uses.
    fn input_arity(&self) -> usize;

    /// Check the configuration. Errors here mean the model cannot run.
    fn validate(&self) -> ModelResult<()>;

    /// `(true, "")` when the model can be simulated, otherwise `false` with
    /// the reason.
    fn is_simulatable(&self) -> (bool, String) {
        match self.validate() {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Advance one time step of `dt_s` seconds.
    ///
    /// Samples that are NaN or equal `bad_value` are treated as missing.
    fn iterate(
        &mut self,
        inputs: &[f64],
        dt_s: f64,
        bad_value: f64,
        diagnostics: &mut Diagnostics,
    ) -> ModelOutput;

    /// Output once all transients have settled, without touching state.
    fn steady_state_output(&self, inputs: &[f64], bad_value: f64) -> Option<f64>;

    /// Value of input `input_index` that yields steady-state output `y0`.
    ///
    /// `inputs` is a full input vector; the entry at `input_index` and any
    /// missing entries are ignored.
    fn steady_state_input(&self, y0: f64, input_index: usize, inputs: &[f64]) -> ModelResult<f64>;

    /// Reset internal memory so the next step starts at steady state.
    fn warm_start(&mut self, inputs: &[f64], output: f64);
}

/// Any model known to the workspace.
#[derive(Debug, Clone)]
pub enum ProcessModel {
    Unit(UnitModel),
    GainSched(GainSchedModel),
    Divide(Divide),
    Select(Select),
}

macro_rules! delegate {
    ($self:ident, $m:ident => $body:expr) => {
        match $self {
            ProcessModel::Unit($m) => $body,
            ProcessModel::GainSched($m) => $body,
            ProcessModel::Divide($m) => $body,
            ProcessModel::Select($m) => $body,
        }
    };
}

impl SimulatableModel for ProcessModel {
    fn id(&self) -> &str {
        delegate!(self, m => m.id())
    }

    fn kind(&self) -> ModelKind {
        delegate!(self, m => m.kind())
    }

    fn input_arity(&self) -> usize {
        delegate!(self, m => m.input_arity())
    }

    fn validate(&self) -> ModelResult<()> {
        delegate!(self, m => m.validate())
    }

    fn is_simulatable(&self) -> (bool, String) {
        delegate!(self, m => m.is_simulatable())
    }

    fn iterate(
        &mut self,
        inputs: &[f64],
        dt_s: f64,
        bad_value: f64,
        diagnostics: &mut Diagnostics,
    ) -> ModelOutput {
        delegate!(self, m => m.iterate(inputs, dt_s, bad_value, diagnostics))
    }

    fn steady_state_output(&self, inputs: &[f64], bad_value: f64) -> Option<f64> {
        delegate!(self, m => m.steady_state_output(inputs, bad_value))
    }

    fn steady_state_input(&self, y0: f64, input_index: usize, inputs: &[f64]) -> ModelResult<f64> {
        delegate!(self, m => m.steady_state_input(y0, input_index, inputs))
    }

    fn warm_start(&mut self, inputs: &[f64], output: f64) {
        delegate!(self, m => m.warm_start(inputs, output))
    }
}

impl From<UnitModel> for ProcessModel {
    fn from(m: UnitModel) -> Self {
        Self::Unit(m)
    }
}

impl From<GainSchedModel> for ProcessModel {
    fn from(m: GainSchedModel) -> Self {
        Self::GainSched(m)
    }
}

impl From<Divide> for ProcessModel {
    fn from(m: Divide) -> Self {
        Self::Divide(m)
    }
}

impl From<Select> for ProcessModel {
    fn from(m: Select) -> Self {
        Self::Select(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::UnitParameters;
    use crate::select::SelectKind;

    #[test]
    fn enum_delegates_to_variant() {
        let mut models: Vec<ProcessModel> = vec![
            UnitModel::new("u", UnitParameters::new(vec![2.0], 1.0)).into(),
            Select::new("s", SelectKind::Max, 2).into(),
        ];
        assert_eq!(models[0].kind(), ModelKind::Unit);
        assert_eq!(models[1].input_arity(), 2);

        let mut diag = Diagnostics::new();
        let y = models[0].iterate(&[3.0], 1.0, uf_core::DEFAULT_BAD_VALUE, &mut diag);
        assert_eq!(y.y, 7.0);
        let y = models[1].iterate(&[3.0, 4.0], 1.0, uf_core::DEFAULT_BAD_VALUE, &mut diag);
        assert_eq!(y.y, 4.0);
        assert!(diag.is_empty());
    }

    #[test]
    fn invalid_model_reports_reason() {
        let model: ProcessModel = UnitModel::new("u", UnitParameters::default()).into();
        let (ok, reason) = model.is_simulatable();
        assert!(!ok);
        assert!(reason.contains("linear_gains"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(ModelKind::GainSched.to_string(), "gain_sched");
    }
}
