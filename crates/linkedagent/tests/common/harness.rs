//! Test harness for isolated engine instances.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use linkedagent::api::{JobCreateRequest, LoginRequest};
use linkedagent::session::{DemoAuthenticator, DEMO_EMAIL, DEMO_PASSWORD};
use linkedagent::simulator::{FixedOutcomePolicy, Outcome, OutcomePolicy};
use linkedagent::{Engine, Job, JobsApi, Settings};

use super::builders::{url_list, SettingsBuilder};

/// An engine with its own temp credential file and a deterministic policy.
pub struct TestHarness {
    /// Keeps the credential directory alive for the harness' lifetime.
    pub temp_dir: TempDir,
    pub engine: Engine,
}

impl TestHarness {
    /// Advances 50 URLs per tick and always succeeds.
    pub fn new() -> Self {
        Self::with_policy(FixedOutcomePolicy::new(50, Outcome::Success))
    }

    pub fn with_policy(policy: impl OutcomePolicy + 'static) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = SettingsBuilder::new(temp_dir.path()).build();
        Self::with_settings(temp_dir, settings, Arc::new(policy))
    }

    pub fn with_settings(
        temp_dir: TempDir,
        settings: Settings,
        policy: Arc<dyn OutcomePolicy>,
    ) -> Self {
        let engine = Engine::new(settings, DemoAuthenticator::default(), policy);
        Self { temp_dir, engine }
    }

    pub fn api(&self) -> &JobsApi {
        self.engine.api()
    }

    /// Logs in with the demo account.
    pub fn logged_in(self) -> Self {
        self.api()
            .login(&LoginRequest::new(DEMO_EMAIL, DEMO_PASSWORD))
            .expect("demo login failed");
        self
    }

    /// Uploads a list of `urls` profiles and creates a job over it.
    pub fn create_job(&self, urls: usize) -> Job {
        let upload = self
            .api()
            .upload_file("leads.csv", url_list(urls).as_bytes())
            .expect("upload failed");
        self.api()
            .create_job(JobCreateRequest::for_file(upload.file_id))
            .expect("job creation failed")
    }

    pub fn tick(&self, times: usize) {
        for _ in 0..times {
            self.engine.simulator().tick();
        }
    }
}
