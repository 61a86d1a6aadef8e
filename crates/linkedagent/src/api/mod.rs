//! Authenticated operations consumed by the dashboard.

pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::sync::{broadcast, watch};

pub use wire::{ErrorBody, FileUploadResponse, JobCreateRequest, LoginRequest, LoginResponse};

use crate::broadcast::{JobUpdate, Subscription, SubscriptionEvent, UpdateChannel, UpdateSource};
use crate::error::ApiError;
use crate::files::FileRegistry;
use crate::ids::{FileId, JobId, TenantId};
use crate::job::{Job, JobList, JobQuery, JobStore};
use crate::session::SessionGate;
use crate::stats::Stats;
use crate::tenant::{Tenant, TenantDirectory};

/// Every operation except `login` requires a session; a call made without
/// one fails with [`ApiError::Unauthorized`] and ends the session.
pub struct JobsApi {
    session: Arc<SessionGate>,
    store: Arc<JobStore>,
    files: Arc<FileRegistry>,
    tenants: Arc<TenantDirectory>,
    reconnect_backoff: Duration,
    default_page_size: u32,
}

impl JobsApi {
    pub fn new(
        session: Arc<SessionGate>,
        store: Arc<JobStore>,
        files: Arc<FileRegistry>,
        tenants: Arc<TenantDirectory>,
    ) -> Self {
        Self {
            session,
            store,
            files,
            tenants,
            reconnect_backoff: Duration::from_secs(3),
            default_page_size: crate::job::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let token = self.session.login(&request.email, &request.password)?;
        Ok(LoginResponse {
            token: token.expose_secret().to_string(),
        })
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn tenants(&self) -> Result<Vec<Tenant>, ApiError> {
        self.guarded(|| Ok(self.tenants.list().to_vec()))
    }

    pub fn current_tenant(&self) -> Result<TenantId, ApiError> {
        self.guarded(|| Ok(self.tenants.current()))
    }

    pub fn set_current_tenant(&self, id: TenantId) -> Result<(), ApiError> {
        self.guarded(|| self.tenants.set_current(id))
    }

    pub fn list_jobs(&self, query: &JobQuery) -> Result<JobList, ApiError> {
        self.guarded(|| {
            let query = JobQuery {
                page_size: query.page_size.or(Some(self.default_page_size)),
                ..query.clone()
            };
            self.store.list(&query)
        })
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, ApiError> {
        self.guarded(|| self.store.get(id))
    }

    /// Creates a job for the current tenant over every URL in the uploaded list.
    pub fn create_job(&self, request: JobCreateRequest) -> Result<Job, ApiError> {
        self.guarded(|| {
            let file_id = request.file_id;
            let total_urls = self.files.url_count(&file_id)?;
            let tenant = self.tenants.current();
            self.store
                .create_for_file(tenant, file_id, total_urls, request.into_config())
        })
    }

    pub fn cancel_job(&self, id: &JobId) -> Result<Job, ApiError> {
        self.guarded(|| self.store.cancel(id))
    }

    pub fn upload_file(&self, filename: &str, bytes: &[u8]) -> Result<FileUploadResponse, ApiError> {
        self.guarded(|| {
            let file_id = self.files.upload(filename, bytes)?;
            Ok(FileUploadResponse { file_id })
        })
    }

    /// Download link for an uploaded list or a job's output.
    pub fn download_file(&self, id: &FileId) -> Result<String, ApiError> {
        self.guarded(|| self.files.download_url(id))
    }

    pub fn stats(&self) -> Result<Stats, ApiError> {
        self.guarded(|| Ok(Stats::compute(&self.store.snapshot(), chrono::Utc::now())))
    }

    /// Opens a reconnecting update subscription. Must be called within a
    /// tokio runtime.
    pub fn subscribe<F>(&self, observer: F) -> Result<Subscription, ApiError>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        self.guarded(|| {
            let source = GatedUpdates {
                session: Arc::clone(&self.session),
                channel: self.store.updates().clone(),
            };
            Ok(Subscription::spawn(
                Arc::new(source),
                self.reconnect_backoff,
                observer,
            ))
        })
    }

    fn guarded<T>(&self, op: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
        self.session.ensure_authenticated()?;
        let result = op();
        if let Err(ApiError::Unauthorized) = result {
            self.session.expire();
        }
        result
    }
}

/// Update source that refuses to connect without a session and cuts off
/// delivery when the session ends.
struct GatedUpdates {
    session: Arc<SessionGate>,
    channel: UpdateChannel,
}

impl UpdateSource for GatedUpdates {
    fn connect(&self) -> Result<broadcast::Receiver<JobUpdate>, ApiError> {
        self.session.ensure_authenticated()?;
        Ok(self.channel.subscribe())
    }

    fn authorization(&self) -> Option<watch::Receiver<bool>> {
        Some(self.session.session_state())
    }
}
