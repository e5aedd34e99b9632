pub mod classify;
pub mod context;
pub mod fetch;
pub mod fingerprint;
pub mod heuristic;
pub mod job;
pub mod notify;
pub mod relevance;
pub mod scheduling;
pub mod store;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use context::{JobSettings, MonitorContext};
pub use job::{JobError, JobOutcome};
pub use scheduling::{Scheduler, SchedulerConfig, SchedulerStats};
