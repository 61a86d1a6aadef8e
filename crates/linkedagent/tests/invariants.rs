//! Property tests: job invariants hold across arbitrary interleavings of
//! creation, simulator ticks and cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use linkedagent::simulator::RandomOutcomePolicy;
use linkedagent::{
    FileRegistry, Job, JobConfig, JobId, JobStatus, JobStore, ProgressSimulator, TenantId,
    UpdateChannel,
};

#[derive(Debug, Clone)]
enum Op {
    Create(u64),
    Tick,
    Cancel(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (1u64..300).prop_map(Op::Create),
        4 => Just(Op::Tick),
        1 => any::<usize>().prop_map(Op::Cancel),
    ]
}

fn check(job: &Job) -> Result<(), TestCaseError> {
    prop_assert!(job.processed <= job.total_urls, "processed beyond total: {:?}", job);
    prop_assert_eq!(
        job.output_file_id.is_some(),
        job.status == JobStatus::Success,
        "outputFileId must be set exactly on success: {:?}",
        job
    );
    prop_assert!(job.updated_at >= job.created_at);
    if job.status == JobStatus::Success {
        prop_assert_eq!(job.processed, job.total_urls);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lifecycle_invariants(
        seed in any::<u64>(),
        ratio in 0.0f64..=1.0,
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let updates = UpdateChannel::new(4096);
        let mut rx = updates.subscribe();
        let store = Arc::new(JobStore::new(updates));
        let simulator = ProgressSimulator::new(
            Arc::clone(&store),
            Arc::new(FileRegistry::new("https://api.example.test/v1")),
            Arc::new(RandomOutcomePolicy::with_seed(ratio, 10..=59, seed)),
        );

        let tenant = TenantId::new();
        let mut ids: Vec<JobId> = Vec::new();
        let mut previous: HashMap<JobId, Job> = HashMap::new();

        for op in ops {
            match op {
                Op::Create(total) => {
                    let job = store.create(tenant, total, JobConfig::default()).unwrap();
                    ids.push(job.id);
                }
                Op::Tick => {
                    simulator.tick();
                }
                Op::Cancel(pick) => {
                    if !ids.is_empty() {
                        let id = ids[pick % ids.len()];
                        let before = store.get(&id).unwrap();
                        let after = store.cancel(&id).unwrap();
                        if before.is_terminal() {
                            prop_assert_eq!(&after, &before);
                        } else {
                            prop_assert_eq!(after.status, JobStatus::Cancelled);
                            prop_assert_eq!(after.processed, before.processed);
                        }
                    }
                }
            }

            for job in store.snapshot() {
                check(&job)?;
                if let Some(old) = previous.get(&job.id) {
                    prop_assert!(job.revision >= old.revision);
                    prop_assert!(job.updated_at >= old.updated_at);
                    prop_assert!(job.processed >= old.processed);
                    if old.is_terminal() {
                        prop_assert_eq!(&job, old, "terminal job changed");
                    }
                }
                previous.insert(job.id, job);
            }
        }

        // Every update is a snapshot with a strictly higher revision for its job.
        let mut last_revision: HashMap<JobId, u64> = HashMap::new();
        while let Ok(update) = rx.try_recv() {
            let last = last_revision.entry(update.job_id).or_insert(0);
            prop_assert!(update.revision > *last);
            *last = update.revision;
        }
        for (id, revision) in last_revision {
            prop_assert_eq!(store.get(&id).unwrap().revision, revision);
        }
    }
}
