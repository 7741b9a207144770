//! Simulatable process models for Unitflow.
//!
//! This crate provides the model side of the workspace: units that a plant
//! simulator steps in time and that the identification crate fits from data.
//!
//! # Architecture
//!
//! Every model is evaluated in two stages:
//! - A **static** part ([`steady_state`]) with bias, gains, optional
//!   curvature and hold-last-good substitution of bad samples
//! - A **dynamic** part ([`dynamics`]) with a first-order lag and pure delay
//!
//! The closed set of model kinds lives in [`ProcessModel`], which implements
//! [`SimulatableModel`] by delegation. Scenario files describe models through
//! [`ModelDef`].
//!
//! # Design Principles
//!
//! - **Owned state**: each model owns its parameters and memory; `Clone` gives
//!   an independent copy
//! - **Explicit diagnostics**: iteration reports into a caller-supplied
//!   [`uf_core::Diagnostics`]
//! - **Late validation**: parameter inconsistencies surface through
//!   [`SimulatableModel::validate`], never at construction

pub mod divide;
pub mod dynamics;
pub mod error;
pub mod fitting;
pub mod gain_sched;
pub mod model;
pub mod output;
pub mod params;
pub mod select;
pub mod spec;
pub mod steady_state;
pub mod unit;

pub use divide::{Divide, DivideParameters};
pub use dynamics::{DynamicsStage, LowPass, MAX_DELAY_SAMPLES, StageState, TimeDelay};
pub use error::{ModelError, ModelResult};
pub use fitting::{FittingResult, ModelWarning};
pub use gain_sched::{GainSchedModel, GainSchedParameters, schedule_index};
pub use model::{ModelKind, ProcessModel, SimulatableModel};
pub use output::ModelOutput;
pub use params::UnitParameters;
pub use select::{Select, SelectKind};
pub use spec::{ModelDef, ModelSpec};
pub use steady_state::{InputTerms, StaticValue, SteadyStateEngine, invert_input};
pub use unit::UnitModel;
