pub mod api;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod ids;
pub mod job;
pub mod session;
pub mod simulator;
pub mod stats;
pub mod telemetry;
pub mod tenant;

pub use api::JobsApi;
pub use broadcast::{JobBoard, JobUpdate, Subscription, SubscriptionEvent, UpdateChannel};
pub use config::Settings;
pub use engine::Engine;
pub use error::{ApiError, ErrorDisposition, LinkedAgentError, Result};
pub use files::FileRegistry;
pub use ids::{FileId, JobId, TenantId};
pub use job::{Job, JobConfig, JobList, JobQuery, JobStatus, JobStore};
pub use session::SessionGate;
pub use simulator::{ProgressSimulator, SimulatorScheduler};
pub use stats::Stats;
pub use tenant::{Tenant, TenantDirectory};
