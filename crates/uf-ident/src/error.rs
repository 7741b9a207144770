//! Error types for identification.

use thiserror::Error;
use uf_models::ModelError;

/// Errors that stop an identification before any fit is attempted.
///
/// Numerical trouble inside a fit is not an error; it is recorded on the
/// result as a warning with `able_to_identify = false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentError {
    #[error("Problem setup error: {what}")]
    ProblemSetup { what: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type IdentResult<T> = Result<T, IdentError>;
