//! How much a running job advances per tick and how it ends.

use std::ops::RangeInclusive;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::job::Job;

/// Work a policy wants applied to one job in one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickPlan {
    pub processed: u64,
    pub retries: u64,
}

/// Final status for a job that processed all of its URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

/// Drives the progress simulator.
///
/// `plan_tick` is asked once per running job per tick. `completion` is asked
/// only when the planned work reaches the job's total.
pub trait OutcomePolicy: Send + Sync {
    fn plan_tick(&self, job: &Job) -> TickPlan;

    fn completion(&self, job: &Job) -> Outcome;
}

/// Uniform random progress with a weighted coin for the outcome.
pub struct RandomOutcomePolicy {
    success_ratio: f64,
    delta: RangeInclusive<u64>,
    rng: Mutex<StdRng>,
}

impl RandomOutcomePolicy {
    pub const DEFAULT_SUCCESS_RATIO: f64 = 0.9;
    pub const DEFAULT_DELTA: RangeInclusive<u64> = 10..=59;

    pub fn new(success_ratio: f64, delta: RangeInclusive<u64>) -> Self {
        Self::with_rng(success_ratio, delta, StdRng::from_entropy())
    }

    /// Reproducible sequence for tests and demos.
    pub fn with_seed(success_ratio: f64, delta: RangeInclusive<u64>, seed: u64) -> Self {
        Self::with_rng(success_ratio, delta, StdRng::seed_from_u64(seed))
    }

    fn with_rng(success_ratio: f64, delta: RangeInclusive<u64>, rng: StdRng) -> Self {
        let (low, high) = (*delta.start(), *delta.end());
        let success_ratio = if success_ratio.is_nan() {
            log::warn!(
                "Success ratio is not a number, using {}",
                Self::DEFAULT_SUCCESS_RATIO
            );
            Self::DEFAULT_SUCCESS_RATIO
        } else {
            success_ratio.clamp(0.0, 1.0)
        };
        Self {
            success_ratio,
            delta: low.min(high)..=high.max(low),
            rng: Mutex::new(rng),
        }
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Outcome policy RNG lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for RandomOutcomePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUCCESS_RATIO, Self::DEFAULT_DELTA)
    }
}

impl OutcomePolicy for RandomOutcomePolicy {
    fn plan_tick(&self, _job: &Job) -> TickPlan {
        TickPlan {
            processed: self.rng().gen_range(self.delta.clone()),
            retries: 0,
        }
    }

    fn completion(&self, _job: &Job) -> Outcome {
        if self.rng().gen_bool(self.success_ratio) {
            Outcome::Success
        } else {
            Outcome::Error
        }
    }
}

/// Same plan every tick. Handy for deterministic runs.
#[derive(Debug, Clone)]
pub struct FixedOutcomePolicy {
    pub plan: TickPlan,
    pub outcome: Outcome,
}

impl FixedOutcomePolicy {
    pub fn new(processed_per_tick: u64, outcome: Outcome) -> Self {
        Self {
            plan: TickPlan {
                processed: processed_per_tick,
                retries: 0,
            },
            outcome,
        }
    }
}

impl OutcomePolicy for FixedOutcomePolicy {
    fn plan_tick(&self, _job: &Job) -> TickPlan {
        self.plan
    }

    fn completion(&self, _job: &Job) -> Outcome {
        self.outcome
    }
}
