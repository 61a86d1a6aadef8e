//! Job entity and its lifecycle transitions.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::ids::{FileId, JobId, TenantId};

pub const CONCURRENCY_RANGE: RangeInclusive<u8> = 1..=10;
pub const RETRIES_RANGE: RangeInclusive<u8> = 0..=5;
pub const TIMEOUT_RANGE_SECS: RangeInclusive<u16> = 30..=300;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are absorbing: nothing moves a job out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ApiError::validation(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// Scraping parameters chosen in the creation wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: u8,
    #[serde(default = "default_retries")]
    pub retries: u8,
    /// Per-profile fetch timeout in seconds.
    #[serde(default = "default_timeout", rename = "timeout")]
    pub timeout_secs: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_profile_id: Option<String>,
}

fn default_concurrency() -> u8 {
    3
}

fn default_retries() -> u8 {
    2
}

fn default_timeout() -> u16 {
    120
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retries: default_retries(),
            timeout_secs: default_timeout(),
            proxy_profile_id: None,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !CONCURRENCY_RANGE.contains(&self.concurrency) {
            return Err(ApiError::validation(format!(
                "concurrency must be between {} and {}, got {}",
                CONCURRENCY_RANGE.start(),
                CONCURRENCY_RANGE.end(),
                self.concurrency
            )));
        }
        if !RETRIES_RANGE.contains(&self.retries) {
            return Err(ApiError::validation(format!(
                "retries must be between {} and {}, got {}",
                RETRIES_RANGE.start(),
                RETRIES_RANGE.end(),
                self.retries
            )));
        }
        if !TIMEOUT_RANGE_SECS.contains(&self.timeout_secs) {
            return Err(ApiError::validation(format!(
                "timeout must be between {} and {} seconds, got {}",
                TIMEOUT_RANGE_SECS.start(),
                TIMEOUT_RANGE_SECS.end(),
                self.timeout_secs
            )));
        }
        if let Some(ref proxy) = self.proxy_profile_id {
            if proxy.trim().is_empty() {
                return Err(ApiError::validation("proxyProfileId must not be blank"));
            }
        }
        Ok(())
    }
}

/// Result of asking a job to change state.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// Work reported for one job during one simulator tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressDelta {
    pub processed: u64,
    pub retries: u64,
}

/// What should happen if a progress step brings `processed` to `total_urls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalDecision {
    /// Stay in `running`; a later tick decides.
    Continue,
    Succeed { output_file_id: FileId },
    Fail,
}

/// A scraping job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub status: JobStatus,
    pub total_urls: u64,
    pub processed: u64,
    pub retry_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub output_file_id: Option<FileId>,
    /// Uploaded URL list the job was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    #[serde(default)]
    pub config: JobConfig,
    /// Bumped by one on every applied mutation.
    #[serde(default)]
    pub revision: u64,
}

impl Job {
    pub(crate) fn new(
        tenant_id: TenantId,
        total_urls: u64,
        file_id: Option<FileId>,
        config: JobConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        if total_urls == 0 {
            return Err(ApiError::validation("totalUrls must be greater than zero"));
        }
        config.validate()?;

        Ok(Self {
            id: JobId::new(),
            tenant_id,
            status: JobStatus::Queued,
            total_urls,
            processed: 0,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            output_file_id: None,
            file_id,
            config,
            revision: 0,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total_urls
    }

    pub fn remaining(&self) -> u64 {
        self.total_urls.saturating_sub(self.processed)
    }

    /// Share of URLs processed, in percent.
    pub fn progress_percent(&self) -> f64 {
        if self.total_urls == 0 {
            return 0.0;
        }
        self.processed as f64 * 100.0 / self.total_urls as f64
    }

    /// Checks the data-model invariants. Used when accepting snapshots
    /// from outside the state machine.
    pub fn check_invariants(&self) -> Result<(), ApiError> {
        if self.processed > self.total_urls {
            return Err(ApiError::validation(format!(
                "job {}: processed {} exceeds totalUrls {}",
                self.id, self.processed, self.total_urls
            )));
        }
        if self.output_file_id.is_some() != (self.status == JobStatus::Success) {
            return Err(ApiError::validation(format!(
                "job {}: outputFileId must be set exactly when status is success",
                self.id
            )));
        }
        if self.updated_at < self.created_at {
            return Err(ApiError::validation(format!(
                "job {}: updatedAt precedes createdAt",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        // Wall clocks can step backwards; updatedAt must not.
        self.updated_at = self.updated_at.max(now);
        self.revision += 1;
    }

    /// `queued -> running`.
    pub(crate) fn start(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status != JobStatus::Queued {
            return Transition::Unchanged;
        }
        self.status = JobStatus::Running;
        self.touch(now);
        Transition::Applied
    }

    /// Advances a running job by `delta`, clamped to `total_urls`. When the job
    /// becomes complete the `decision` picks the terminal state.
    pub(crate) fn apply_progress(
        &mut self,
        delta: ProgressDelta,
        decision: TerminalDecision,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status != JobStatus::Running {
            return Transition::Unchanged;
        }

        let processed = self
            .processed
            .saturating_add(delta.processed)
            .min(self.total_urls);
        let completes = processed == self.total_urls && decision != TerminalDecision::Continue;

        if processed == self.processed && delta.retries == 0 && !completes {
            return Transition::Unchanged;
        }

        self.processed = processed;
        self.retry_count = self.retry_count.saturating_add(delta.retries);

        if completes {
            match decision {
                TerminalDecision::Succeed { output_file_id } => {
                    self.status = JobStatus::Success;
                    self.output_file_id = Some(output_file_id);
                }
                TerminalDecision::Fail => {
                    self.status = JobStatus::Error;
                }
                TerminalDecision::Continue => {}
            }
        }

        self.touch(now);
        Transition::Applied
    }

    /// `queued | running -> cancelled`. A terminal job is left alone.
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        self.status = JobStatus::Cancelled;
        self.touch(now);
        Transition::Applied
    }
}
