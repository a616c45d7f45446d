use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::gate::GateError;

#[derive(Error, Debug)]
pub enum RepohookError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GitHub request failed: {0}")]
    Gate(#[from] GateError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Other error: {0}")]
    Other(String),
}
