//! Error types for process model operations.

use thiserror::Error;

/// Result type for process model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when configuring, validating or inverting a model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Invalid argument provided to a model function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Parameter arrays disagree with each other or with the declared arity.
    #[error("Configuration mismatch: {what}")]
    ConfigurationMismatch { what: String },

    /// Model was fitted but identification failed; it cannot be simulated.
    #[error("Model '{id}' was not able to be identified")]
    NotIdentified { id: String },

    /// Steady-state inversion has only complex roots.
    #[error("No real steady-state solution for input {input_index}")]
    NoRealSolution { input_index: usize },

    /// Steady-state inversion is undefined (zero gain, no consistent region).
    #[error("Steady-state input cannot be computed: {what}")]
    NotInvertible { what: String },

    /// Operation not offered by this model kind.
    #[error("Not supported: {what}")]
    NotSupported { what: &'static str },
}
