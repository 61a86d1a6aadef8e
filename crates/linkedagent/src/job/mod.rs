//! Job entity, lifecycle and storage.

pub mod model;
pub mod store;

pub use model::{
    Job, JobConfig, JobStatus, ProgressDelta, TerminalDecision, Transition, CONCURRENCY_RANGE,
    RETRIES_RANGE, TIMEOUT_RANGE_SECS,
};
pub use store::{JobList, JobQuery, JobStore, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
