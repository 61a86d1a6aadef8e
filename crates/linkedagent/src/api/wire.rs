//! Request and response bodies, camelCase on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::ids::FileId;
use crate::job::JobConfig;

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Body of a job creation request. Omitted settings take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreateRequest {
    pub file_id: FileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u8>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_profile_id: Option<String>,
}

impl JobCreateRequest {
    pub fn for_file(file_id: FileId) -> Self {
        Self {
            file_id,
            concurrency: None,
            retries: None,
            timeout: None,
            proxy_profile_id: None,
        }
    }

    pub fn into_config(self) -> JobConfig {
        let defaults = JobConfig::default();
        JobConfig {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            retries: self.retries.unwrap_or(defaults.retries),
            timeout_secs: self.timeout.unwrap_or(defaults.timeout_secs),
            proxy_profile_id: self.proxy_profile_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub file_id: FileId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
