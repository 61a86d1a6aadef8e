//! In-memory job store.
//!
//! Holds every job of the process behind an index lock plus one mutex per
//! job. Mutations go through the job's own lock, so a long tick over many
//! jobs never blocks readers of unrelated jobs, and inserts are the only
//! operations that take the index for writing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::{JobUpdate, UpdateChannel};
use crate::error::ApiError;
use crate::ids::{FileId, JobId, TenantId};
use crate::job::model::{Job, JobConfig, JobStatus, ProgressDelta, TerminalDecision, Transition};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// ─── Query types ────────────────────────────────────────────────────────────

/// Query parameters for job listing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// 1-indexed; defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl JobQuery {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn paged(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// Resolves defaults and checks bounds, returning `(page, page_size)`.
    fn resolve(&self) -> Result<(u32, u32), ApiError> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(ApiError::validation("page is 1-indexed and must be at least 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ApiError::validation(format!(
                "pageSize must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        Ok((page, page_size))
    }
}

/// One page of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobList {
    pub data: Vec<Job>,
    pub page: u32,
    pub page_size: u32,
    /// Number of jobs matching the filter across all pages.
    pub total: u64,
}

// ─── JobStore ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreIndex {
    jobs: HashMap<JobId, Arc<Mutex<Job>>>,
    /// Insertion order, oldest first.
    order: Vec<JobId>,
}

/// Shared job store. Pass it around as `Arc<JobStore>`.
pub struct JobStore {
    index: RwLock<StoreIndex>,
    updates: UpdateChannel,
}

impl JobStore {
    /// Creates an empty store publishing its mutations on `updates`.
    pub fn new(updates: UpdateChannel) -> Self {
        Self {
            index: RwLock::new(StoreIndex::default()),
            updates,
        }
    }

    pub fn updates(&self) -> &UpdateChannel {
        &self.updates
    }

    /// Creates a queued job.
    pub fn create(
        &self,
        tenant_id: TenantId,
        total_urls: u64,
        config: JobConfig,
    ) -> Result<Job, ApiError> {
        self.insert_new(tenant_id, total_urls, None, config)
    }

    /// Creates a queued job scraping the URL list `file_id`.
    pub fn create_for_file(
        &self,
        tenant_id: TenantId,
        file_id: FileId,
        total_urls: u64,
        config: JobConfig,
    ) -> Result<Job, ApiError> {
        self.insert_new(tenant_id, total_urls, Some(file_id), config)
    }

    fn insert_new(
        &self,
        tenant_id: TenantId,
        total_urls: u64,
        file_id: Option<FileId>,
        config: JobConfig,
    ) -> Result<Job, ApiError> {
        let job = Job::new(tenant_id, total_urls, file_id, config, Utc::now())?;
        self.insert(job.clone())?;
        log::info!(
            "Created job {} for tenant {} ({} URLs)",
            job.id,
            job.tenant_id,
            job.total_urls
        );
        Ok(job)
    }

    /// Inserts an existing snapshot, e.g. demo data or a restored job.
    pub fn seed(&self, job: Job) -> Result<(), ApiError> {
        if job.total_urls == 0 {
            return Err(ApiError::validation("totalUrls must be greater than zero"));
        }
        job.check_invariants()?;
        job.config.validate()?;
        self.insert(job)
    }

    fn insert(&self, job: Job) -> Result<(), ApiError> {
        let mut index = self.write_index();
        if index.jobs.contains_key(&job.id) {
            return Err(ApiError::Conflict {
                message: format!("job {} already exists", job.id),
            });
        }
        index.order.push(job.id);
        index.jobs.insert(job.id, Arc::new(Mutex::new(job)));
        Ok(())
    }

    /// Returns a snapshot of one job.
    pub fn get(&self, id: &JobId) -> Result<Job, ApiError> {
        let entry = self.entry(id)?;
        let job = lock_job(&entry);
        Ok(job.clone())
    }

    /// Lists jobs newest-created first, filtered by exact status.
    pub fn list(&self, query: &JobQuery) -> Result<JobList, ApiError> {
        let (page, page_size) = query.resolve()?;

        let mut jobs: Vec<Job> = self
            .entries_newest_first()
            .iter()
            .map(|entry| lock_job(entry).clone())
            .filter(|job| query.status.map_or(true, |status| job.status == status))
            .collect();
        // Stable: equal timestamps keep newest-inserted first.
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = jobs.len() as u64;
        let skip = (page as usize - 1).saturating_mul(page_size as usize);
        let data = jobs.into_iter().skip(skip).take(page_size as usize).collect();

        Ok(JobList {
            data,
            page,
            page_size,
            total,
        })
    }

    /// Cancels a queued or running job and returns its state afterwards.
    ///
    /// Cancelling a job that already finished succeeds without changing it.
    pub fn cancel(&self, id: &JobId) -> Result<Job, ApiError> {
        let (job, transition) = self.transition(id, |job, now| job.cancel(now))?;
        match transition {
            Transition::Applied => log::info!(
                "Job {} cancelled at {}/{}",
                id,
                job.processed,
                job.total_urls
            ),
            Transition::Unchanged => {
                log::debug!("Cancel of job {} ignored, status is {}", id, job.status)
            }
        }
        Ok(job)
    }

    /// `queued -> running`. Returns the new snapshot if the job moved.
    pub(crate) fn start(&self, id: &JobId) -> Result<Option<Job>, ApiError> {
        let (job, transition) = self.transition(id, |job, now| job.start(now))?;
        Ok(applied(job, transition))
    }

    /// Applies one tick's progress. Returns the new snapshot if anything changed.
    pub(crate) fn mutate(
        &self,
        id: &JobId,
        delta: ProgressDelta,
        decision: TerminalDecision,
    ) -> Result<Option<Job>, ApiError> {
        let (job, transition) =
            self.transition(id, move |job, now| job.apply_progress(delta, decision, now))?;
        Ok(applied(job, transition))
    }

    /// Runs `apply` under the job's lock and publishes the result if it
    /// changed the job. Publishing before unlocking keeps same-job updates
    /// in mutation order.
    fn transition<F>(&self, id: &JobId, apply: F) -> Result<(Job, Transition), ApiError>
    where
        F: FnOnce(&mut Job, DateTime<Utc>) -> Transition,
    {
        let entry = self.entry(id)?;
        let mut job = lock_job(&entry);
        let transition = apply(&mut job, Utc::now());
        if transition == Transition::Applied {
            self.updates.publish(JobUpdate::from_job(&job));
        }
        Ok((job.clone(), transition))
    }

    /// Ids of all jobs currently in `status`, oldest first.
    pub fn ids_with_status(&self, status: JobStatus) -> Vec<JobId> {
        let index = self.read_index();
        index
            .order
            .iter()
            .filter(|id| {
                index
                    .jobs
                    .get(id)
                    .map_or(false, |entry| lock_job(entry).status == status)
            })
            .copied()
            .collect()
    }

    /// Snapshots of every job, newest-created first.
    pub fn snapshot(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .entries_newest_first()
            .iter()
            .map(|entry| lock_job(entry).clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.read_index().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &JobId) -> Result<Arc<Mutex<Job>>, ApiError> {
        self.read_index()
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::job_not_found(id))
    }

    /// Clones the job handles so the index lock is not held while jobs are locked.
    fn entries_newest_first(&self) -> Vec<Arc<Mutex<Job>>> {
        let index = self.read_index();
        index
            .order
            .iter()
            .rev()
            .filter_map(|id| index.jobs.get(id).cloned())
            .collect()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, StoreIndex> {
        match self.index.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, StoreIndex> {
        match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(UpdateChannel::default())
    }
}

fn lock_job(entry: &Mutex<Job>) -> MutexGuard<'_, Job> {
    match entry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn applied(job: Job, transition: Transition) -> Option<Job> {
    match transition {
        Transition::Applied => Some(job),
        Transition::Unchanged => None,
    }
}
