//! Identification outcome attached to parameter records.

use serde::{Deserialize, Serialize};

/// Informational warnings raised while identifying or checking a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelWarning {
    /// The regression solver failed; parameters are not usable.
    RegressionFailed { solver: String },
    /// Regressor matrix rank is lower than its column count.
    RankDeficientInputs,
    /// Input `index` barely varies over the fitted samples.
    ConstantInput { index: usize },
    /// Time constant came out implausible and was set to zero.
    TimeConstantNotIdentifiable,
    /// Best time delay sits on the upper end of the search range.
    DelayAtSearchLimit,
    /// Bias could not be re-estimated from the simulated model.
    BiasReestimationFailed,
    /// The dataset spans less than a few time constants.
    DataSetShortComparedToTimeConstant,
    /// No fitted sample falls in schedule region `region`; its gains are zero.
    RegionWithoutData { region: usize },
}

/// Quality of an identified model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingResult {
    /// `false` when fitting failed and the model must not be simulated.
    pub able_to_identify: bool,
    /// Name of the solver that produced the parameters.
    pub solver_id: String,
    /// Sum of squared one-step residuals over fitted samples.
    pub objective_value: f64,
    pub r_squared: f64,
    /// Sum of squared errors of the simulated model against measurements.
    pub objective_value_sim: Option<f64>,
    pub r_squared_sim: Option<f64>,
    /// Samples in the dataset.
    pub n_total: usize,
    /// Samples of the dataset that did not enter the fit.
    pub n_excluded: usize,
}

impl Default for FittingResult {
    fn default() -> Self {
        Self {
            able_to_identify: false,
            solver_id: String::new(),
            objective_value: f64::NAN,
            r_squared: f64::NAN,
            objective_value_sim: None,
            r_squared_sim: None,
            n_total: 0,
            n_excluded: 0,
        }
    }
}

impl FittingResult {
    /// Record for a fit that could not be completed.
    pub fn failed(solver_id: impl Into<String>) -> Self {
        Self {
            solver_id: solver_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_serialize_with_tag() {
        let json = serde_json::to_string(&ModelWarning::ConstantInput { index: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"constant_input","index":2}"#);
    }

    #[test]
    fn failed_fit_is_not_identified() {
        let fit = FittingResult::failed("svd");
        assert!(!fit.able_to_identify);
        assert_eq!(fit.solver_id, "svd");
    }
}
