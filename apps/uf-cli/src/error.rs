use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Model error: {0}")]
    Model(#[from] uf_models::ModelError),

    #[error("Identification error: {0}")]
    Ident(#[from] uf_ident::IdentError),

    #[error("{0}")]
    Usage(String),
}

pub type CliResult<T> = Result<T, CliError>;

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Serialize(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Serialize(err.to_string())
    }
}
