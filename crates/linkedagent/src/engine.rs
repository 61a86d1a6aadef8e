//! Wires the store, simulator, session and API together.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::api::JobsApi;
use crate::broadcast::UpdateChannel;
use crate::config::Settings;
use crate::error::ApiError;
use crate::files::FileRegistry;
use crate::ids::JobId;
use crate::job::{Job, JobConfig, JobStatus, JobStore};
use crate::session::{Authenticator, CredentialStore, DemoAuthenticator, SessionGate};
use crate::simulator::{OutcomePolicy, ProgressSimulator, RandomOutcomePolicy, SimulatorScheduler};
use crate::tenant::{TenantDirectory, ACME_TENANT_ID};

/// Owns every shared component. Cloning the `Arc`s out of it is cheap.
pub struct Engine {
    settings: Settings,
    store: Arc<JobStore>,
    files: Arc<FileRegistry>,
    tenants: Arc<TenantDirectory>,
    session: Arc<SessionGate>,
    simulator: Arc<ProgressSimulator>,
    api: JobsApi,
}

impl Engine {
    pub fn new(
        settings: Settings,
        authenticator: impl Authenticator + 'static,
        policy: Arc<dyn OutcomePolicy>,
    ) -> Self {
        let updates = UpdateChannel::new(settings.update_channel_capacity);
        let store = Arc::new(JobStore::new(updates));
        let files = Arc::new(FileRegistry::new(settings.api_base_url.clone()));
        let tenants = Arc::new(TenantDirectory::demo());

        let mut gate = SessionGate::new(authenticator);
        match credential_store(&settings) {
            Some(credentials) => gate = gate.with_credentials(credentials),
            None => log::warn!("No credential path available, sessions will not persist"),
        }
        let session = Arc::new(gate);

        let simulator = Arc::new(ProgressSimulator::new(
            Arc::clone(&store),
            Arc::clone(&files),
            policy,
        ));
        let api = JobsApi::new(
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::clone(&files),
            Arc::clone(&tenants),
        )
        .with_reconnect_backoff(settings.reconnect_backoff())
        .with_default_page_size(settings.default_page_size);

        Self {
            settings,
            store,
            files,
            tenants,
            session,
            simulator,
            api,
        }
    }

    /// Demo account plus the random outcome policy configured in `settings`.
    pub fn demo(settings: Settings) -> Self {
        let policy = RandomOutcomePolicy::new(
            settings.success_ratio,
            settings.progress_delta_min..=settings.progress_delta_max,
        );
        Self::new(settings, DemoAuthenticator::default(), Arc::new(policy))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api(&self) -> &JobsApi {
        &self.api
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn files(&self) -> &Arc<FileRegistry> {
        &self.files
    }

    pub fn tenants(&self) -> &Arc<TenantDirectory> {
        &self.tenants
    }

    pub fn session(&self) -> &Arc<SessionGate> {
        &self.session
    }

    pub fn simulator(&self) -> &Arc<ProgressSimulator> {
        &self.simulator
    }

    /// A scheduler ticking the simulator at the configured interval.
    pub fn scheduler(&self) -> SimulatorScheduler {
        SimulatorScheduler::new(Arc::clone(&self.simulator), self.settings.tick_interval())
    }

    /// Inserts the three sample jobs the dashboard shows on first start.
    pub fn seed_demo_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let now = Utc::now();
        let sample = |status: JobStatus,
                      total_urls: u64,
                      processed: u64,
                      retry_count: u64,
                      created_hours_ago: i64,
                      updated_minutes_ago: i64| {
            let created_at = now - Duration::hours(created_hours_ago);
            Job {
                id: JobId::new(),
                tenant_id: ACME_TENANT_ID,
                status,
                total_urls,
                processed,
                retry_count,
                created_at,
                updated_at: now - Duration::minutes(updated_minutes_ago),
                output_file_id: None,
                file_id: None,
                config: JobConfig::default(),
                revision: 0,
            }
        };

        let running = sample(JobStatus::Running, 1000, 750, 12, 2, 30);
        let mut succeeded = sample(JobStatus::Success, 500, 500, 8, 24, 23 * 60);
        succeeded.output_file_id = Some(self.files.register_output(succeeded.id));
        let failed = sample(JobStatus::Error, 200, 150, 25, 48, 47 * 60);

        let jobs = vec![running, succeeded, failed];
        for job in &jobs {
            self.store.seed(job.clone())?;
        }
        log::info!("Seeded {} demo jobs", jobs.len());
        Ok(jobs)
    }
}

fn credential_store(settings: &Settings) -> Option<CredentialStore> {
    if let Some(ref path) = settings.credential_path {
        return Some(CredentialStore::new(path));
    }
    match CredentialStore::default_path() {
        Ok(path) => Some(CredentialStore::new(path)),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}
