//! uf-core: shared foundation for unitflow.
//!
//! Contains:
//! - numeric (Real + bad-sample helpers)
//! - quadratic (real-root solver used by steady-state inversion)
//! - warnings (deduplicated warning lists carried on parameter records)
//! - diagnostics (explicit collector passed into simulation calls)

pub mod diagnostics;
pub mod numeric;
pub mod quadratic;
pub mod warnings;

// Re-exports: nice ergonomics for downstream crates
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use numeric::*;
pub use quadratic::{QuadraticRoots, solve_quadratic};
pub use warnings::WarningList;
