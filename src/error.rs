use reqwest::StatusCode;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("HTTP request to device failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device rejected command with status {0}")]
    CommandRejected(StatusCode),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid device address: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
