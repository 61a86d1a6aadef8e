//! Progress simulator: advances running jobs on a fixed cadence.

pub mod ledger;
pub mod policy;
pub mod scheduler;

use std::sync::Arc;

pub use ledger::{AttemptLedger, AttemptOutcome};
pub use policy::{FixedOutcomePolicy, Outcome, OutcomePolicy, RandomOutcomePolicy, TickPlan};
pub use scheduler::SimulatorScheduler;

use crate::files::FileRegistry;
use crate::job::{JobStatus, JobStore, ProgressDelta, TerminalDecision};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Queued jobs promoted to running.
    pub started: usize,
    /// Running jobs that advanced but did not finish.
    pub progressed: usize,
    /// Jobs that reached success or error.
    pub completed: usize,
    /// Running jobs the policy had no work for.
    pub idle: usize,
    /// Jobs cancelled between selection and their turn.
    pub skipped: usize,
}

impl TickReport {
    /// Number of updates the tick published.
    pub fn mutations(&self) -> usize {
        self.started + self.progressed + self.completed
    }
}

pub struct ProgressSimulator {
    store: Arc<JobStore>,
    files: Arc<FileRegistry>,
    policy: Arc<dyn OutcomePolicy>,
}

impl ProgressSimulator {
    pub fn new(
        store: Arc<JobStore>,
        files: Arc<FileRegistry>,
        policy: Arc<dyn OutcomePolicy>,
    ) -> Self {
        Self {
            store,
            files,
            policy,
        }
    }

    /// Runs one simulation step.
    ///
    /// Running jobs advance first. Queued jobs are promoted afterwards, so a
    /// job never starts and progresses in the same tick.
    pub fn tick(&self) -> TickReport {
        let _span = tracing::info_span!("simulator.tick").entered();
        let mut report = TickReport::default();

        for id in self.store.ids_with_status(JobStatus::Running) {
            let job = match self.store.get(&id) {
                Ok(job) => job,
                Err(e) => {
                    log::warn!("Simulator lost job {}: {}", id, e);
                    continue;
                }
            };
            if job.status != JobStatus::Running {
                report.skipped += 1;
                continue;
            }

            let plan = self.policy.plan_tick(&job);
            let processed = plan.processed.min(job.remaining());
            let completes = processed == job.remaining();
            if !completes && processed == 0 && plan.retries == 0 {
                report.idle += 1;
                continue;
            }

            let (decision, reserved) = if completes {
                match self.policy.completion(&job) {
                    Outcome::Success => {
                        let output = self.files.register_output(job.id);
                        (
                            TerminalDecision::Succeed {
                                output_file_id: output,
                            },
                            Some(output),
                        )
                    }
                    Outcome::Error => (TerminalDecision::Fail, None),
                }
            } else {
                (TerminalDecision::Continue, None)
            };

            let delta = ProgressDelta {
                processed,
                retries: plan.retries,
            };
            match self.store.mutate(&id, delta, decision) {
                Ok(Some(updated)) if updated.is_terminal() => {
                    log::info!(
                        "Job {} finished with status {} ({} URLs, {} retries)",
                        id,
                        updated.status,
                        updated.total_urls,
                        updated.retry_count
                    );
                    report.completed += 1;
                }
                Ok(Some(_)) => report.progressed += 1,
                Ok(None) => {
                    log::debug!("Job {} changed before its turn, skipping", id);
                    report.skipped += 1;
                    if let Some(output) = reserved {
                        self.files.discard_output(&output);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to advance job {}: {}", id, e);
                    if let Some(output) = reserved {
                        self.files.discard_output(&output);
                    }
                }
            }
        }

        for id in self.store.ids_with_status(JobStatus::Queued) {
            match self.store.start(&id) {
                Ok(Some(_)) => {
                    log::info!("Job {} started", id);
                    report.started += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => log::warn!("Failed to start job {}: {}", id, e),
            }
        }

        if report.mutations() > 0 {
            log::debug!(
                "Tick: {} started, {} progressed, {} completed",
                report.started,
                report.progressed,
                report.completed
            );
        }
        report
    }
}
