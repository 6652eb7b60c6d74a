use crate::types::ErrorCode;
use thiserror::Error;

/// Everything a backend call can fail with.
///
/// Only [`BackendError::Application`] is an answer of the backend itself,
/// the other variants mean the backend could not be talked to properly.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend error: {0}")]
    Application(ErrorCode),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session {0} already in progress")]
    SessionInProgress(String),
    #[error("non conforming response: {0}")]
    NonConforming(String),
}

impl BackendError {
    /// The application error code, if the backend answered with one.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            BackendError::Application(code) => Some(code),
            _ => None,
        }
    }
}
