//! Goodness-of-fit measures over non-excluded samples.

use serde::{Deserialize, Serialize};

/// Pairs `(measured, modelled)` that are finite and not excluded.
fn pairs(measured: &[f64], modelled: &[f64], excluded: &[usize]) -> Vec<(f64, f64)> {
    let mut keep = vec![true; measured.len().min(modelled.len())];
    for &i in excluded {
        if let Some(k) = keep.get_mut(i) {
            *k = false;
        }
    }
    measured
        .iter()
        .zip(modelled)
        .zip(keep)
        .filter(|&((m, s), k)| k && m.is_finite() && s.is_finite())
        .map(|((m, s), _)| (*m, *s))
        .collect()
}

/// Fit measures of a modelled signal against measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    /// `1 − SSE/SST`; NaN when the measurement has no variance.
    pub r_squared: f64,
    /// Sum of squared errors.
    pub sse: f64,
    /// Mean absolute error; NaN without usable samples.
    pub mae: f64,
    pub n_samples: usize,
}

impl FitMetrics {
    pub fn compute(measured: &[f64], modelled: &[f64], excluded: &[usize]) -> Self {
        let p = pairs(measured, modelled, excluded);
        let n = p.len();
        let sse: f64 = p.iter().map(|(m, s)| (m - s).powi(2)).sum();
        if n == 0 {
            return Self {
                r_squared: f64::NAN,
                sse,
                mae: f64::NAN,
                n_samples: 0,
            };
        }
        let mae = p.iter().map(|(m, s)| (m - s).abs()).sum::<f64>() / n as f64;
        let mean = p.iter().map(|(m, _)| m).sum::<f64>() / n as f64;
        let sst: f64 = p.iter().map(|(m, _)| (m - mean).powi(2)).sum();
        let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN };
        Self {
            r_squared,
            sse,
            mae,
            n_samples: n,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn r_squared_never_exceeds_one(
            pairs in prop::collection::vec((-1e3..1e3f64, -1e3..1e3f64), 2..50)
        ) {
            let (y, m): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let fm = FitMetrics::compute(&y, &m, &[]);
            prop_assert!(fm.sse >= 0.0);
            prop_assert!(fm.r_squared.is_nan() || fm.r_squared <= 1.0);
        }
    }
}
