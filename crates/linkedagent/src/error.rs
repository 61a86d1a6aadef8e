use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkedAgentError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential store error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Errors surfaced to callers of the job, file and session operations.
///
/// Each variant belongs to one HTTP status class; see [`ApiError::status_code`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// What the presentation layer should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Session is gone: drop local state and re-authenticate.
    ForceRelogin,
    /// Connectivity problem: keep a banner up and retry later.
    RetryWithBackoff,
    /// Show the message next to the action that triggered it.
    ShowMessage,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn job_not_found(id: impl Display) -> Self {
        ApiError::NotFound {
            resource: "Job",
            id: id.to_string(),
        }
    }

    pub fn file_not_found(id: impl Display) -> Self {
        ApiError::NotFound {
            resource: "File",
            id: id.to_string(),
        }
    }

    pub fn tenant_not_found(id: impl Display) -> Self {
        ApiError::NotFound {
            resource: "Tenant",
            id: id.to_string(),
        }
    }

    /// HTTP status a server would answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation { .. } => 400,
            ApiError::Unauthorized | ApiError::InvalidCredentials => 401,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict { .. } => 409,
            ApiError::Transport(_) => 503,
        }
    }

    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            ApiError::Unauthorized => ErrorDisposition::ForceRelogin,
            ApiError::Transport(_) => ErrorDisposition::RetryWithBackoff,
            _ => ErrorDisposition::ShowMessage,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No platform data directory available for the credential store")]
    NoDataDir,

    #[error("Failed to read credentials from '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write credentials to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file '{path}' is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, LinkedAgentError>;
