//! Declarative model definitions.
//!
//! A [`ModelDef`] is what scenario files contain; [`ModelDef::build`] turns it
//! into a runnable [`ProcessModel`].

use serde::{Deserialize, Serialize};

use crate::divide::{Divide, DivideParameters};
use crate::gain_sched::{GainSchedModel, GainSchedParameters};
use crate::model::{ModelKind, ProcessModel};
use crate::params::UnitParameters;
use crate::select::{Select, SelectKind};
use crate::unit::UnitModel;

/// Model kind and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelSpec {
    Unit {
        params: UnitParameters,
    },
    GainSched {
        params: GainSchedParameters,
    },
    Divide {
        #[serde(default)]
        params: DivideParameters,
    },
    Select {
        kind: SelectKind,
        n_inputs: usize,
    },
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Unit { .. } => ModelKind::Unit,
            Self::GainSched { .. } => ModelKind::GainSched,
            Self::Divide { .. } => ModelKind::Divide,
            Self::Select { .. } => ModelKind::Select,
        }
    }
}

/// Named model definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub id: String,
    pub model: ModelSpec,
}

impl ModelDef {
    pub fn new(id: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            id: id.into(),
            model,
        }
    }

    /// Instantiate with fresh state. Parameters are copied into the model.
    pub fn build(&self) -> ProcessModel {
        let id = self.id.clone();
        match &self.model {
            ModelSpec::Unit { params } => UnitModel::new(id, params.clone()).into(),
            ModelSpec::GainSched { params } => GainSchedModel::new(id, params.clone()).into(),
            ModelSpec::Divide { params } => Divide::new(id, params.clone()).into(),
            ModelSpec::Select { kind, n_inputs } => Select::new(id, *kind, *n_inputs).into(),
        }
    }
}
