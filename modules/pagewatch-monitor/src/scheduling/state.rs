use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use pagewatch_common::SiteConfig;

/// Where a site is in its scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Waiting for `next_run`.
    Idle,
    /// Handed to the job queue, not yet picked up by a worker.
    Queued,
    /// A worker is executing the site job.
    Running,
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleState::Idle => write!(f, "idle"),
            ScheduleState::Queued => write!(f, "queued"),
            ScheduleState::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("site {site}: invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub site: String,
    pub from: ScheduleState,
    pub to: ScheduleState,
}

/// Scheduler-owned state for one site.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub site: Arc<SiteConfig>,
    pub next_run: Instant,
    state: ScheduleState,
}

impl ScheduleEntry {
    pub fn new(site: Arc<SiteConfig>, next_run: Instant) -> Self {
        Self {
            site,
            next_run,
            state: ScheduleState::Idle,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.state == ScheduleState::Idle && self.next_run <= now
    }

    /// Allowed: Idle -> Queued, Queued -> Running, Queued -> Idle, Running -> Idle.
    pub fn transition(&mut self, to: ScheduleState) -> Result<(), TransitionError> {
        use ScheduleState::*;

        match (self.state, to) {
            (Idle, Queued) | (Queued, Running) | (Queued, Idle) | (Running, Idle) => {
                self.state = to;
                Ok(())
            }
            (from, to) => Err(TransitionError {
                site: self.site.id.clone(),
                from,
                to,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ScheduleEntry {
        ScheduleEntry::new(
            Arc::new(SiteConfig::new("a", "https://a.example")),
            Instant::now(),
        )
    }

    #[test]
    fn full_cycle_is_allowed() {
        let mut e = entry();
        e.transition(ScheduleState::Queued).unwrap();
        e.transition(ScheduleState::Running).unwrap();
        e.transition(ScheduleState::Idle).unwrap();
        assert_eq!(e.state(), ScheduleState::Idle);
    }

    #[test]
    fn queued_can_be_abandoned() {
        let mut e = entry();
        e.transition(ScheduleState::Queued).unwrap();
        e.transition(ScheduleState::Idle).unwrap();
    }

    #[test]
    fn double_queue_is_rejected() {
        let mut e = entry();
        e.transition(ScheduleState::Queued).unwrap();
        let err = e.transition(ScheduleState::Queued).unwrap_err();
        assert_eq!(err.from, ScheduleState::Queued);
        assert_eq!(err.to.to_string(), "queued");
    }

    #[test]
    fn idle_cannot_jump_to_running() {
        let mut e = entry();
        assert!(e.transition(ScheduleState::Running).is_err());
        assert_eq!(e.state(), ScheduleState::Idle);
    }

    #[test]
    fn running_cannot_requeue() {
        let mut e = entry();
        e.transition(ScheduleState::Queued).unwrap();
        e.transition(ScheduleState::Running).unwrap();
        assert!(e.transition(ScheduleState::Queued).is_err());
        assert!(!e.is_due(Instant::now()));
    }
}
