//! Observer-side cache of job snapshots fed by the update stream.

use std::collections::HashMap;

use crate::broadcast::job_updates::JobUpdate;
use crate::ids::JobId;
use crate::job::Job;

/// What [`JobBoard::apply`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The board already holds the same or a newer revision.
    Stale,
    /// The job is not on the board; a resync will bring it in.
    Unknown,
}

/// Last-known state of every job an observer has seen.
///
/// Updates are merged last-write-wins by revision, so a late or duplicated
/// update never rolls a job back.
#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: HashMap<JobId, Job>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole board with a fresh listing.
    pub fn replace_all(&mut self, jobs: impl IntoIterator<Item = Job>) {
        self.jobs = jobs.into_iter().map(|job| (job.id, job)).collect();
    }

    pub fn apply(&mut self, update: &JobUpdate) -> ApplyOutcome {
        let Some(job) = self.jobs.get_mut(&update.job_id) else {
            return ApplyOutcome::Unknown;
        };
        if update.revision <= job.revision {
            log::debug!(
                "Dropping stale update for job {} (revision {} <= {})",
                update.job_id,
                update.revision,
                job.revision
            );
            return ApplyOutcome::Stale;
        }

        job.processed = update.processed;
        job.status = update.status;
        job.retry_count = update.retry_count;
        job.output_file_id = update.output_file_id;
        job.updated_at = update.updated_at;
        job.revision = update.revision;
        ApplyOutcome::Applied
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All jobs, newest-created first.
    pub fn jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// True once every job on the board reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.jobs.values().all(Job::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::UpdateChannel;
    use crate::ids::TenantId;
    use crate::job::{JobConfig, JobStatus, JobStore};

    #[test]
    fn test_apply_newer_revision() {
        let store = JobStore::new(UpdateChannel::new(8));
        let mut rx = store.updates().subscribe();
        let job = store.create(TenantId::new(), 10, JobConfig::default()).unwrap();

        let mut board = JobBoard::new();
        board.replace_all(store.snapshot());
        let _ = store.cancel(&job.id).unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(board.apply(&update), ApplyOutcome::Applied);
        assert_eq!(board.get(&job.id).unwrap().status, JobStatus::Cancelled);
        assert!(board.all_terminal());
    }

    #[test]
    fn test_stale_update_does_not_roll_back() {
        let store = JobStore::new(UpdateChannel::new(8));
        let mut rx = store.updates().subscribe();
        let job = store.create(TenantId::new(), 10, JobConfig::default()).unwrap();
        let _ = store.cancel(&job.id).unwrap();
        let update = rx.try_recv().unwrap();

        let mut board = JobBoard::new();
        board.replace_all(store.snapshot());

        // Already reflected in the snapshot.
        assert_eq!(board.apply(&update), ApplyOutcome::Stale);

        let mut older = update.clone();
        older.revision = 0;
        older.status = JobStatus::Running;
        assert_eq!(board.apply(&older), ApplyOutcome::Stale);
        assert_eq!(board.get(&job.id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_unknown_job() {
        let store = JobStore::new(UpdateChannel::new(8));
        let mut rx = store.updates().subscribe();
        let job = store.create(TenantId::new(), 10, JobConfig::default()).unwrap();
        let _ = store.cancel(&job.id).unwrap();

        let mut board = JobBoard::new();
        assert_eq!(board.apply(&rx.try_recv().unwrap()), ApplyOutcome::Unknown);
        assert!(board.is_empty());
    }
}
