//! Parameters of the unit model.

use serde::{Deserialize, Serialize};
use uf_core::WarningList;

use crate::error::{ModelError, ModelResult};
use crate::fitting::{FittingResult, ModelWarning};
use crate::steady_state::InputTerms;

/// Parameters of a first-order-plus-delay unit with optional curvature.
///
/// Optional per-input arrays must be index-parallel to `linear_gains`; this is
/// checked by [`UnitParameters::validate`], not at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitParameters {
    pub linear_gains: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_gain_unc: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curvatures: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curvature_unc: Option<Vec<f64>>,
    /// Operating point per input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u0: Option<Vec<f64>>,
    /// Curvature normalization per input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_norm: Option<Vec<f64>>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_unc: Option<f64>,
    #[serde(default)]
    pub time_constant_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_constant_unc_s: Option<f64>,
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

impl Default for UnitParameters {
    fn default() -> Self {
        Self::new(Vec::new(), 0.0)
    }
}

impl UnitParameters {
    /// Static linear unit.
    pub fn new(linear_gains: Vec<f64>, bias: f64) -> Self {
        Self {
            linear_gains,
            linear_gain_unc: None,
            curvatures: None,
            curvature_unc: None,
            u0: None,
            u_norm: None,
            bias,
            bias_unc: None,
            time_constant_s: 0.0,
            time_constant_unc_s: None,
            time_delay_s: 0.0,
            y_min: None,
            y_max: None,
            fitting: None,
            warnings: WarningList::new(),
        }
    }

    pub fn with_time_constant(mut self, time_constant_s: f64) -> Self {
        self.time_constant_s = time_constant_s;
        self
    }

    pub fn with_time_delay(mut self, time_delay_s: f64) -> Self {
        self.time_delay_s = time_delay_s;
        self
    }

    pub fn with_curvatures(mut self, curvatures: Vec<f64>) -> Self {
        self.curvatures = Some(curvatures);
        self
    }

    pub fn with_operating_point(mut self, u0: Vec<f64>) -> Self {
        self.u0 = Some(u0);
        self
    }

    pub fn with_u_norm(mut self, u_norm: Vec<f64>) -> Self {
        self.u_norm = Some(u_norm);
        self
    }

    pub fn with_output_limits(mut self, y_min: Option<f64>, y_max: Option<f64>) -> Self {
        self.y_min = y_min;
        self.y_max = y_max;
        self
    }

    pub fn num_inputs(&self) -> usize {
        self.linear_gains.len()
    }

    pub fn input_terms(&self) -> InputTerms<'_> {
        InputTerms {
            gains: &self.linear_gains,
            curvatures: self.curvatures.as_deref(),
            u0: self.u0.as_deref(),
            u_norm: self.u_norm.as_deref(),
        }
    }

    pub fn add_warning(&mut self, warning: ModelWarning) {
        self.warnings.push(warning);
    }

    /// Hand-specified parameters count as identified.
    pub fn is_identified(&self) -> bool {
        self.fitting.as_ref().is_none_or(|f| f.able_to_identify)
    }

    pub fn validate(&self) -> ModelResult<()> {
        let n = self.linear_gains.len();
        if n == 0 {
            return Err(ModelError::InvalidArg {
                what: "linear_gains must not be empty",
            });
        }
        if self.linear_gains.iter().any(|g| !g.is_finite()) {
            return Err(ModelError::InvalidArg {
                what: "linear_gains must be finite",
            });
        }
        check_parallel("curvatures", self.curvatures.as_deref(), n)?;
        check_parallel("u0", self.u0.as_deref(), n)?;
        check_parallel("u_norm", self.u_norm.as_deref(), n)?;
        if let Some(norm) = &self.u_norm
            && norm.iter().any(|v| !v.is_finite() || *v == 0.0)
        {
            return Err(ModelError::InvalidArg {
                what: "u_norm entries must be finite and non-zero",
            });
        }
        if !(self.time_constant_s.is_finite() && self.time_constant_s >= 0.0) {
            return Err(ModelError::InvalidArg {
                what: "time constant must be finite and non-negative",
            });
        }
        if !(self.time_delay_s.is_finite() && self.time_delay_s >= 0.0) {
            return Err(ModelError::InvalidArg {
                what: "time delay must be finite and non-negative",
            });
        }
        check_limits(self.y_min, self.y_max)
    }
}

pub(crate) fn check_parallel(name: &str, values: Option<&[f64]>, n: usize) -> ModelResult<()> {
    match values {
        Some(v) if v.len() != n => Err(ModelError::ConfigurationMismatch {
            what: format!("{name} has {} entries, expected {n}", v.len()),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_limits(y_min: Option<f64>, y_max: Option<f64>) -> ModelResult<()> {
    if let (Some(lo), Some(hi)) = (y_min, y_max)
        && lo > hi
    {
        return Err(ModelError::ConfigurationMismatch {
            what: format!("y_min {lo} exceeds y_max {hi}"),
        });
    }
    Ok(())
}

/// Clamp to optional bounds; NaN passes through.
pub(crate) fn clamp_output(y: f64, y_min: Option<f64>, y_max: Option<f64>) -> f64 {
    let y = match y_min {
        Some(lo) if y < lo => lo,
        _ => y,
    };
    match y_max {
        Some(hi) if y > hi => hi,
        _ => y,
    }
}
