//! Job update broadcaster for real-time job status streaming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::ApiError;
use crate::ids::{FileId, JobId};
use crate::job::{Job, JobStatus};

/// Snapshot of a job after one mutation, as pushed to observers.
///
/// Serializes as the stream message `{"type": "update", "jobId": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "update", rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: JobId,
    pub processed: u64,
    pub status: JobStatus,
    #[serde(default)]
    pub retry_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_id: Option<FileId>,
    pub updated_at: DateTime<Utc>,
    /// Per-job sequence number; higher wins.
    pub revision: u64,
}

impl JobUpdate {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            processed: job.processed,
            status: job.status,
            retry_count: job.retry_count,
            output_file_id: job.output_file_id,
            updated_at: job.updated_at,
            revision: job.revision,
        }
    }
}

/// Anything a subscription can (re)connect to.
pub trait UpdateSource: Send + Sync + 'static {
    fn connect(&self) -> Result<broadcast::Receiver<JobUpdate>, ApiError>;

    /// Whether delivery is still authorised. A connected subscription drops
    /// its stream as soon as this changes and goes back to reconnecting.
    fn authorization(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

/// Broadcasts job updates to every connected subscriber.
#[derive(Clone)]
pub struct UpdateChannel {
    sender: broadcast::Sender<JobUpdate>,
}

impl UpdateChannel {
    /// Creates a new channel. Subscribers lagging more than `capacity`
    /// updates behind lose the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends an update to all subscribers and returns how many received it.
    pub fn publish(&self, update: JobUpdate) -> usize {
        // No active receivers is fine
        self.sender.send(update).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UpdateSource for UpdateChannel {
    fn connect(&self) -> Result<broadcast::Receiver<JobUpdate>, ApiError> {
        Ok(self.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TenantId;
    use crate::job::JobConfig;

    fn sample_update() -> JobUpdate {
        let job = Job::new(TenantId::new(), 10, None, JobConfig::default(), Utc::now()).unwrap();
        JobUpdate::from_job(&job)
    }

    #[test]
    fn test_channel_send_receive() {
        let channel = UpdateChannel::new(10);
        let mut rx = channel.subscribe();

        let update = sample_update();
        assert_eq!(channel.publish(update.clone()), 1);

        let received = rx.try_recv().unwrap();
        assert_eq!(received, update);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channel = UpdateChannel::default();
        assert_eq!(channel.publish(sample_update()), 0);
    }

    #[test]
    fn test_wire_format() {
        let update = sample_update();
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["processed"], 0);
        assert!(value.get("jobId").is_some());
        assert!(value.get("outputFileId").is_none());

        let back: JobUpdate = serde_json::from_value(value).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_receiver_count() {
        let channel = UpdateChannel::new(4);
        assert_eq!(channel.receiver_count(), 0);
        let _a = channel.connect().unwrap();
        let _b = channel.subscribe();
        assert_eq!(channel.receiver_count(), 2);
    }
}
