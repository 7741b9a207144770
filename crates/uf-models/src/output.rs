//! Values produced by one model iteration.

use serde::{Deserialize, Serialize};

/// Output of [`crate::SimulatableModel::iterate`].
///
/// `y_internal` is present only when the caller supplied an additive
/// disturbance beyond the model's declared inputs; it holds the output before
/// the disturbance was added.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Primary simulated output.
    pub y: f64,
    /// Pre-disturbance internal value.
    pub y_internal: Option<f64>,
}

impl ModelOutput {
    /// Output without an internal value.
    pub fn scalar(y: f64) -> Self {
        Self {
            y,
            y_internal: None,
        }
    }

    /// Output of a model that cannot be simulated.
    pub fn nan() -> Self {
        Self::scalar(f64::NAN)
    }

    /// One or two values, primary output first.
    pub fn to_vec(&self) -> Vec<f64> {
        match self.y_internal {
            Some(x) => vec![self.y, x],
            None => vec![self.y],
        }
    }
}

impl From<f64> for ModelOutput {
    fn from(y: f64) -> Self {
        Self::scalar(y)
    }
}
