//! First-order lag plus pure delay.
//!
//! Process models compute a static value each step and pass it through a
//! [`DynamicsStage`]:
//! - **Low-pass**: one-step exponential smoothing at the model time constant
//! - **Delay line**: ring buffer of `round(delay / dt)` samples
//!
//! The stage seeds itself on first use so a new or warm-started model begins
//! at steady state instead of ramping up from zero.

use std::collections::VecDeque;

/// Longest delay line, in samples.
pub const MAX_DELAY_SAMPLES: usize = 100_000;

/// Lifecycle of a [`DynamicsStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// No sample seen since construction or the last reset.
    Uninitialized,
    /// Filter memory holds the previous output.
    Running,
}

/// Discrete first-order low-pass filter.
///
/// `x[k] = a·x[k-1] + (1-a)·s[k]` with `a = 1/(1 + dt/T)`.
#[derive(Debug, Clone)]
pub struct LowPass {
    prev: f64,
}

impl Default for LowPass {
    fn default() -> Self {
        Self { prev: f64::NAN }
    }
}

impl LowPass {
    /// Smoothing factor for time constant `tc_s` at sample interval `dt_s`.
    ///
    /// Returns 0 (no filtering) when `tc_s < 0.4·dt_s`, which also covers
    /// static models with `tc_s == 0` and non-finite inputs.
    pub fn smoothing_factor(tc_s: f64, dt_s: f64) -> f64 {
        if !(tc_s >= 0.4 * dt_s) || tc_s <= 0.0 {
            return 0.0;
        }
        let a = 1.0 / (1.0 + dt_s / tc_s);
        if a.is_finite() { a } else { 0.0 }
    }

    /// Force the filter memory to `value`.
    pub fn seed(&mut self, value: f64) {
        self.prev = value;
    }

    /// Advance one sample.
    ///
    /// A non-finite memory (e.g. after a run of unusable samples) is
    /// re-seeded from the current input.
    pub fn step(&mut self, signal: f64, tc_s: f64, dt_s: f64) -> f64 {
        let out = if self.prev.is_finite() {
            let a = Self::smoothing_factor(tc_s, dt_s);
            a * self.prev + (1.0 - a) * signal
        } else {
            signal
        };
        self.prev = out;
        out
    }
}

/// Pure delay of a fixed number of samples.
///
/// The buffer is filled with the first value it receives, so the output holds
/// that value until the delayed signal arrives.
#[derive(Debug, Clone)]
pub struct TimeDelay {
    depth: usize,
    buffer: VecDeque<f64>,
}

impl TimeDelay {
    /// Delay of `delay_s` seconds at sample interval `dt_s`.
    pub fn new(delay_s: f64, dt_s: f64) -> Self {
        let depth = Self::delay_samples(delay_s, dt_s);
        Self {
            depth,
            buffer: VecDeque::with_capacity(depth + 1),
        }
    }

    /// Number of whole samples for a delay, rounded to nearest and capped at
    /// [`MAX_DELAY_SAMPLES`].
    ///
    /// Delays that are not a multiple of `dt_s` are rounded silently.
    pub fn delay_samples(delay_s: f64, dt_s: f64) -> usize {
        if !(delay_s > 0.0) || !(dt_s > 0.0) {
            return 0;
        }
        let n = (delay_s / dt_s).round();
        if n.is_finite() {
            n.min(MAX_DELAY_SAMPLES as f64) as usize
        } else {
            0
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Push a sample and return the sample from `depth` steps ago.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.depth == 0 {
            return value;
        }
        if self.buffer.is_empty() {
            self.buffer.extend(std::iter::repeat_n(value, self.depth));
        }
        self.buffer.push_back(value);
        self.buffer.pop_front().unwrap_or(value)
    }
}

/// Low-pass followed by an optional delay line.
#[derive(Debug, Clone)]
pub struct DynamicsStage {
    state: StageState,
    low_pass: LowPass,
    delay: Option<TimeDelay>,
}

impl Default for DynamicsStage {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicsStage {
    pub fn new() -> Self {
        Self {
            state: StageState::Uninitialized,
            low_pass: LowPass::default(),
            delay: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Filter and delay one static value.
    ///
    /// The time constant may change between calls (gain scheduling); the
    /// delay depth is fixed by the first call after a reset.
    pub fn step(&mut self, x_static: f64, time_constant_s: f64, time_delay_s: f64, dt_s: f64) -> f64 {
        let x_dynamic = match self.state {
            StageState::Uninitialized => {
                self.low_pass.seed(x_static);
                self.state = StageState::Running;
                x_static
            }
            StageState::Running => self.low_pass.step(x_static, time_constant_s, dt_s),
        };

        if time_delay_s <= 0.0 {
            return x_dynamic;
        }
        self.delay
            .get_or_insert_with(|| TimeDelay::new(time_delay_s, dt_s))
            .push(x_dynamic)
    }

    /// Forget all memory; the next step starts at steady state.
    pub fn reset(&mut self) {
        self.state = StageState::Uninitialized;
        self.low_pass = LowPass::default();
        self.delay = None;
    }
}
