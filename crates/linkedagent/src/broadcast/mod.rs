pub mod job_board;
pub mod job_updates;
pub mod subscription;

pub use job_board::{ApplyOutcome, JobBoard};
pub use job_updates::{JobUpdate, UpdateChannel, UpdateSource};
pub use subscription::{Subscription, SubscriptionEvent};
