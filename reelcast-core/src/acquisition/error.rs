use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("retrieval engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("failed to register locator {locator}: {reason}")]
    Registration { locator: String, reason: String },
    #[error("retrieval engine rejected {method} (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("{method} got no answer within {after:?}")]
    Timeout { method: String, after: Duration },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed engine response: {0}")]
    Protocol(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("no video file found under {0}")]
    MediaNotFound(PathBuf),
    #[error("acquisition cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(error: reqwest::Error) -> Self {
        AcquisitionError::Network(error.to_string())
    }
}

impl From<serde_json::Error> for AcquisitionError {
    fn from(error: serde_json::Error) -> Self {
        AcquisitionError::Protocol(error.to_string())
    }
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;
