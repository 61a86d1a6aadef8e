//! Dashboard summary figures.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub jobs_last30_days: u64,
    /// `success / (success + error)`, 0.0 when nothing finished.
    pub success_rate: f64,
    /// Mean run time of successful jobs, in seconds.
    pub avg_duration: f64,
}

impl Stats {
    /// Summarises the jobs created within the 30 days before `now`.
    pub fn compute(jobs: &[Job], now: DateTime<Utc>) -> Self {
        let since = now - Duration::days(30);
        let recent: Vec<&Job> = jobs.iter().filter(|j| j.created_at >= since).collect();

        let succeeded: Vec<&&Job> = recent
            .iter()
            .filter(|j| j.status == JobStatus::Success)
            .collect();
        let failed = recent
            .iter()
            .filter(|j| j.status == JobStatus::Error)
            .count();

        let finished = succeeded.len() + failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            succeeded.len() as f64 / finished as f64
        };

        let avg_duration = if succeeded.is_empty() {
            0.0
        } else {
            let total: i64 = succeeded
                .iter()
                .map(|j| (j.updated_at - j.created_at).num_seconds())
                .sum();
            total as f64 / succeeded.len() as f64
        };

        Self {
            jobs_last30_days: recent.len() as u64,
            success_rate,
            avg_duration,
        }
    }
}
