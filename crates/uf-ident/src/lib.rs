//! Parameter identification for unitflow process models.
//!
//! This crate fits model parameters from sampled process data. The core is a
//! weighted, regularized least-squares regression solved by SVD; the unit
//! identifier builds difference-equation regressors on top of it and searches
//! the time delay in parallel. The gain-scheduled identifier fits one gain
//! vector per schedule region in a single regression.

pub mod error;
pub mod gain_sched_ident;
pub mod metrics;
pub mod regression;
pub mod unit_ident;

pub use error::{IdentError, IdentResult};
pub use gain_sched_ident::{GainSchedIdentConfig, GainSchedIdentifier, simulate_gain_sched};
pub use metrics::FitMetrics;
pub use regression::{RegressionConfig, RegressionResult, RegressionWarning, SOLVER_ID, regress};
pub use unit_ident::{FittingSpecs, IdentifierConfig, UnitDataSet, UnitIdentifier, simulate_unit};
