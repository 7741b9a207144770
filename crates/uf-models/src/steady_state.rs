//! Static (steady-state) evaluation and inversion.
//!
//! The static value of a model is
//! `bias + Σ gain_i·(u_i − u0_i) + Σ curvature_i·(u_i − u0_i)²/u_norm_i`
//! plus any additive inputs beyond the model arity. The process part and the
//! additive part are kept separate so that dynamics act on the process part
//! only.

use uf_core::{QuadraticRoots, is_bad_sample, solve_quadratic};

use crate::error::{ModelError, ModelResult};

/// Borrowed view of per-input coefficients.
#[derive(Debug, Clone, Copy)]
pub struct InputTerms<'a> {
    pub gains: &'a [f64],
    pub curvatures: Option<&'a [f64]>,
    pub u0: Option<&'a [f64]>,
    pub u_norm: Option<&'a [f64]>,
}

impl<'a> InputTerms<'a> {
    /// Purely linear terms without operating point.
    pub fn linear(gains: &'a [f64]) -> Self {
        Self {
            gains,
            curvatures: None,
            u0: None,
            u_norm: None,
        }
    }

    pub fn len(&self) -> usize {
        self.gains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }

    pub fn gain(&self, i: usize) -> f64 {
        self.gains.get(i).copied().unwrap_or(0.0)
    }

    pub fn u0_at(&self, i: usize) -> f64 {
        self.u0.and_then(|v| v.get(i).copied()).unwrap_or(0.0)
    }

    /// Normalization for input `i`; 1 when absent, zero or non-finite.
    pub fn u_norm_at(&self, i: usize) -> f64 {
        match self.u_norm.and_then(|v| v.get(i).copied()) {
            Some(n) if n.is_finite() && n != 0.0 => n,
            _ => 1.0,
        }
    }

    /// Curvature for input `i`; `None` when absent or NaN.
    pub fn curvature_at(&self, i: usize) -> Option<f64> {
        self.curvatures
            .and_then(|v| v.get(i).copied())
            .filter(|c| !c.is_nan())
    }

    pub fn linear_term(&self, i: usize, u: f64) -> f64 {
        self.gain(i) * (u - self.u0_at(i))
    }

    pub fn curvature_term(&self, i: usize, u: f64) -> f64 {
        match self.curvature_at(i) {
            Some(c) => {
                let du = u - self.u0_at(i);
                c * du * du / self.u_norm_at(i)
            }
            None => 0.0,
        }
    }

    /// Full contribution of input `i` at value `u`.
    pub fn contribution(&self, i: usize, u: f64) -> f64 {
        self.linear_term(i, u) + self.curvature_term(i, u)
    }
}

/// Static value split into the part dynamics act on and the bypass part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticValue {
    /// `bias + Σ contributions` over model inputs.
    pub process: f64,
    /// Sum of inputs beyond the model arity.
    pub additive: f64,
}

impl StaticValue {
    pub fn total(&self) -> f64 {
        self.process + self.additive
    }
}

/// Evaluate the static value for already-cleaned inputs.
///
/// `model_inputs` are the first `terms.len()` inputs; `additive` holds the
/// rest, which are summed unmodified.
pub fn evaluate(terms: &InputTerms<'_>, bias: f64, model_inputs: &[f64], additive: &[f64]) -> StaticValue {
    let process = model_inputs
        .iter()
        .enumerate()
        .fold(bias, |acc, (i, &u)| acc + terms.contribution(i, u));
    StaticValue {
        process,
        additive: additive.iter().sum(),
    }
}

/// Hold-last-good-value substitution for bad samples.
#[derive(Debug, Clone, Default)]
pub struct SteadyStateEngine {
    last_good: Vec<f64>,
}

impl SteadyStateEngine {
    pub fn new(n_inputs: usize) -> Self {
        Self {
            last_good: vec![f64::NAN; n_inputs],
        }
    }

    pub fn last_good(&self) -> &[f64] {
        &self.last_good
    }

    pub fn reset(&mut self) {
        self.last_good.iter_mut().for_each(|v| *v = f64::NAN);
    }

    fn ensure_len(&mut self, n: usize) {
        if self.last_good.len() < n {
            self.last_good.resize(n, f64::NAN);
        }
    }

    /// Replace bad samples among the first `n_model` inputs by the last good
    /// value seen at that index, recording good samples as they pass.
    ///
    /// Returns the cleaned model inputs; positions beyond `n_model` are left
    /// to the caller.
    pub fn hold_last_good(&mut self, inputs: &[f64], n_model: usize, bad_value: f64) -> Vec<f64> {
        self.ensure_len(n_model);
        inputs
            .iter()
            .take(n_model)
            .enumerate()
            .map(|(i, &u)| {
                if is_bad_sample(u, bad_value) {
                    self.last_good[i]
                } else {
                    self.last_good[i] = u;
                    u
                }
            })
            .collect()
    }

    /// Like [`Self::hold_last_good`] but leaves the stored values untouched.
    pub fn peek(&self, inputs: &[f64], n_model: usize, bad_value: f64) -> Vec<f64> {
        inputs
            .iter()
            .take(n_model)
            .enumerate()
            .map(|(i, &u)| {
                if is_bad_sample(u, bad_value) {
                    self.last_good.get(i).copied().unwrap_or(f64::NAN)
                } else {
                    u
                }
            })
            .collect()
    }

    /// Clean inputs and evaluate the static value.
    pub fn compute(&mut self, terms: &InputTerms<'_>, bias: f64, inputs: &[f64], bad_value: f64) -> StaticValue {
        let n = terms.len().min(inputs.len());
        let cleaned = self.hold_last_good(inputs, n, bad_value);
        evaluate(terms, bias, &cleaned, additive_part(inputs, n))
    }

    /// Record every good sample as the last good value.
    pub fn seed(&mut self, inputs: &[f64], bad_value: f64) {
        let n = self.last_good.len().min(inputs.len());
        self.hold_last_good(inputs, n, bad_value);
    }
}

/// Inputs past the model arity.
pub fn additive_part(inputs: &[f64], n_model: usize) -> &[f64] {
    inputs.get(n_model..).unwrap_or(&[])
}

/// Solve for input `index` so that its contribution equals `residual`.
///
/// Linear: `u = u0 + residual/gain`. With curvature the quadratic
/// `a·x² + gain·x − residual = 0` in `x = u − u0` is solved with
/// `a = curvature/u_norm`; of two real roots the smaller is taken.
pub fn invert_input(terms: &InputTerms<'_>, index: usize, residual: f64) -> ModelResult<f64> {
    if index >= terms.len() {
        return Err(ModelError::InvalidArg {
            what: "input index outside model inputs",
        });
    }
    let gain = terms.gain(index);
    let u0 = terms.u0_at(index);

    let Some(curvature) = terms.curvature_at(index).filter(|c| *c != 0.0) else {
        if gain == 0.0 || !gain.is_finite() {
            return Err(ModelError::NotInvertible {
                what: format!("gain of input {index} is zero"),
            });
        }
        return Ok(u0 + residual / gain);
    };

    let a = curvature / terms.u_norm_at(index);
    match solve_quadratic(a, gain, -residual) {
        QuadraticRoots::Complex { .. } => Err(ModelError::NoRealSolution { input_index: index }),
        QuadraticRoots::Degenerate => Err(ModelError::NotInvertible {
            what: format!("input {index} has no effect on the output"),
        }),
        roots => roots
            .smallest_real()
            .map(|x| u0 + x)
            .ok_or(ModelError::NoRealSolution { input_index: index }),
    }
}
