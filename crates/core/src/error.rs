use thiserror::Error;

use crate::state::SessionState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Client not ready (state: {0})")]
    NotReady(SessionState),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Method not allowed: {scope}.{method}")]
    MethodNotAllowed { scope: String, method: String },

    #[error("Method not found: {scope}.{method}")]
    MethodNotFound { scope: String, method: String },

    #[error("Not a group: {0}")]
    NotAGroup(String),

    /// The messaging platform refused or failed the operation.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Transport failure talking to the automation driver.
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
