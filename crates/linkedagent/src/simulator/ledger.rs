//! Outcome accounting from real attempt results.
//!
//! Instead of dice rolls, [`AttemptLedger`] advances a job by the attempts
//! reported through [`AttemptLedger::record_attempt_result`] since the last
//! tick, and decides success or error from the share of URLs that exhausted
//! their retries.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::ids::JobId;
use crate::job::Job;
use crate::simulator::policy::{Outcome, OutcomePolicy, TickPlan};

/// Result of one fetch attempt for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Profile scraped; the URL is done.
    Fetched,
    /// Attempt failed and will be retried; the URL is not done yet.
    Retried,
    /// Attempt failed with no retries left; the URL is done, unsuccessfully.
    Exhausted,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    pending_processed: u64,
    pending_retries: u64,
    fetched: u64,
    exhausted: u64,
}

pub struct AttemptLedger {
    tallies: Mutex<HashMap<JobId, Tally>>,
    max_failure_ratio: f64,
}

impl AttemptLedger {
    pub const DEFAULT_MAX_FAILURE_RATIO: f64 = 0.1;

    /// A job succeeds when at most `max_failure_ratio` of its URLs exhausted
    /// their retries.
    pub fn new(max_failure_ratio: f64) -> Self {
        Self {
            tallies: Mutex::new(HashMap::new()),
            max_failure_ratio: max_failure_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn record_attempt_result(&self, job_id: JobId, outcome: AttemptOutcome) {
        let mut tallies = self.tallies();
        let tally = tallies.entry(job_id).or_default();
        match outcome {
            AttemptOutcome::Fetched => {
                tally.pending_processed += 1;
                tally.fetched += 1;
            }
            AttemptOutcome::Exhausted => {
                tally.pending_processed += 1;
                tally.exhausted += 1;
            }
            AttemptOutcome::Retried => tally.pending_retries += 1,
        }
    }

    /// Share of finished URLs that failed for good, if any finished.
    pub fn failure_ratio(&self, job_id: &JobId) -> Option<f64> {
        let tallies = self.tallies();
        let tally = tallies.get(job_id)?;
        let finished = tally.fetched + tally.exhausted;
        (finished > 0).then(|| tally.exhausted as f64 / finished as f64)
    }

    fn tallies(&self) -> MutexGuard<'_, HashMap<JobId, Tally>> {
        match self.tallies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Attempt ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for AttemptLedger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_FAILURE_RATIO)
    }
}

impl OutcomePolicy for AttemptLedger {
    fn plan_tick(&self, job: &Job) -> TickPlan {
        let mut tallies = self.tallies();
        let Some(tally) = tallies.get_mut(&job.id) else {
            return TickPlan::default();
        };
        let plan = TickPlan {
            processed: tally.pending_processed,
            retries: tally.pending_retries,
        };
        tally.pending_processed = 0;
        tally.pending_retries = 0;
        plan
    }

    fn completion(&self, job: &Job) -> Outcome {
        let tally = self.tallies().remove(&job.id).unwrap_or_default();
        let finished = tally.fetched + tally.exhausted;
        if finished == 0 {
            log::warn!("Job {} completed without recorded attempts", job.id);
            return Outcome::Error;
        }
        let ratio = tally.exhausted as f64 / finished as f64;
        if ratio <= self.max_failure_ratio {
            Outcome::Success
        } else {
            log::info!(
                "Job {} failed: {}/{} URLs exhausted their retries",
                job.id,
                tally.exhausted,
                finished
            );
            Outcome::Error
        }
    }
}
