pub mod scheduler;
pub mod stagger;
pub mod state;

pub use scheduler::{EntrySnapshot, Scheduler, SchedulerConfig, SchedulerStats};
pub use state::{ScheduleEntry, ScheduleState, TransitionError};
