use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pagewatch_common::{MonitorConfig, SiteConfig};

use crate::context::MonitorContext;
use crate::job;

use super::stagger;
use super::state::{ScheduleEntry, ScheduleState};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker count and the cap on queued + running jobs.
    pub max_concurrency: usize,
    /// First runs are spread evenly across this window.
    pub stagger_window: Duration,
    pub stagger_jitter: Duration,
    /// Dispatcher period.
    pub tick: Duration,
    pub max_enqueue_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_monitor(&MonitorConfig::default())
    }
}

impl SchedulerConfig {
    pub fn from_monitor(monitor: &MonitorConfig) -> Self {
        Self {
            max_concurrency: monitor.max_concurrency,
            stagger_window: monitor.stagger_window(),
            stagger_jitter: monitor.stagger_jitter(),
            tick: monitor.tick(),
            max_enqueue_per_tick: monitor.max_enqueue_per_tick(),
        }
    }
}

/// Totals for one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub failures: u64,
    pub peak_concurrency: usize,
}

impl fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} failures={} peak_concurrency={}",
            self.cycles, self.failures, self.peak_concurrency
        )
    }
}

/// Point-in-time view of one schedule entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub site_id: String,
    pub next_run: Instant,
    pub state: ScheduleState,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    failures: AtomicU64,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Per-site timing with a bounded worker pool.
///
/// A dispatcher task marks due sites Queued and pushes their index into a
/// channel sized to `max_concurrency`; exactly `max_concurrency` workers pull
/// from it. A site is only dispatched from Idle, so it never has two jobs in
/// flight.
pub struct Scheduler {
    config: SchedulerConfig,
    ctx: Arc<MonitorContext>,
    entries: Arc<Mutex<Vec<ScheduleEntry>>>,
    counters: Arc<Counters>,
}

impl Scheduler {
    /// Register `sites` with staggered first runs starting now.
    pub fn new(
        mut config: SchedulerConfig,
        ctx: Arc<MonitorContext>,
        sites: impl IntoIterator<Item = SiteConfig>,
    ) -> Self {
        config.max_concurrency = config.max_concurrency.max(1);
        config.max_enqueue_per_tick = config.max_enqueue_per_tick.max(1);

        let sites: Vec<Arc<SiteConfig>> = sites.into_iter().map(Arc::new).collect();
        let start = Instant::now();
        let count = sites.len();
        let mut rng = rand::rng();

        let entries = sites
            .into_iter()
            .enumerate()
            .map(|(i, site)| {
                let offset = stagger::initial_offset(
                    i,
                    count,
                    config.stagger_window,
                    config.stagger_jitter,
                    &mut rng,
                );
                debug!(site = %site.id, offset = ?offset, "Registered site");
                ScheduleEntry::new(site, start + offset)
            })
            .collect();

        Self {
            config,
            ctx,
            entries: Arc::new(Mutex::new(entries)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| EntrySnapshot {
                site_id: e.site.id.clone(),
                next_run: e.next_run,
                state: e.state(),
            })
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            peak_concurrency: self.counters.peak.load(Ordering::SeqCst),
        }
    }

    /// Dispatch until `shutdown` fires, then let in-flight jobs finish and
    /// join every worker before returning.
    pub async fn run(&self, shutdown: CancellationToken) -> SchedulerStats {
        let (tx, rx) = mpsc::channel::<usize>(self.config.max_concurrency);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 0..self.config.max_concurrency {
            let worker = Worker {
                id,
                rx: rx.clone(),
                entries: self.entries.clone(),
                ctx: self.ctx.clone(),
                counters: self.counters.clone(),
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run());
        }

        let site_count = self.entries.lock().await.len();
        info!(
            sites = site_count,
            workers = self.config.max_concurrency,
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.dispatch(&tx).await;
                }
            }
        }

        info!("Shutdown requested, draining workers");
        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduler worker panicked");
            }
        }

        let stats = self.stats();
        info!("Scheduler stopped. {stats}");
        stats
    }

    /// Queue due Idle sites in `next_run` order without exceeding either limit.
    async fn dispatch(&self, tx: &mpsc::Sender<usize>) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let active = entries
            .iter()
            .filter(|e| e.state() != ScheduleState::Idle)
            .count();
        let budget = self
            .config
            .max_concurrency
            .saturating_sub(active)
            .min(self.config.max_enqueue_per_tick);
        if budget == 0 {
            return 0;
        }

        let mut due: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_due(now))
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| entries[i].next_run);
        due.truncate(budget);

        let mut enqueued = 0;
        for idx in due {
            let entry = &mut entries[idx];
            if let Err(e) = entry.transition(ScheduleState::Queued) {
                error!(error = %e, "Skipping dispatch");
                continue;
            }
            match tx.try_send(idx) {
                Ok(()) => {
                    debug!(site = %entry.site.id, "Queued site job");
                    enqueued += 1;
                }
                Err(e) => {
                    warn!(site = %entry.site.id, error = %e, "Job queue refused site");
                    let _ = entry.transition(ScheduleState::Idle);
                    break;
                }
            }
        }
        enqueued
    }
}

struct Worker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<usize>>>,
    entries: Arc<Mutex<Vec<ScheduleEntry>>>,
    ctx: Arc<MonitorContext>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };
            let Some(idx) = next else { break };
            let Some(site) = self.begin(idx).await else {
                continue;
            };

            let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak.fetch_max(running, Ordering::SeqCst);

            let result = job::run(&self.ctx, &site).await;

            self.counters.running.fetch_sub(1, Ordering::SeqCst);
            self.counters.cycles.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = result {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(site = %site.id, worker = self.id, error = %e, "Site job failed, rescheduling");
            }

            self.finish(idx, &site).await;
        }
        debug!(worker = self.id, "Worker exiting");
    }

    /// Queued -> Running, or back to Idle if shutdown started while it waited.
    async fn begin(&self, idx: usize) -> Option<Arc<SiteConfig>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(idx)?;

        if self.shutdown.is_cancelled() {
            if let Err(e) = entry.transition(ScheduleState::Idle) {
                error!(error = %e, "Could not release queued site");
            }
            debug!(site = %entry.site.id, "Released queued site on shutdown");
            return None;
        }

        match entry.transition(ScheduleState::Running) {
            Ok(()) => Some(entry.site.clone()),
            Err(e) => {
                error!(error = %e, "Could not start site job");
                None
            }
        }
    }

    /// Running -> Idle with the next run drawn from the site's cadence.
    async fn finish(&self, idx: usize, site: &SiteConfig) {
        let delay = stagger::next_delay(site.check_min, site.check_max, &mut rand::rng());
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(idx) {
            entry.next_run = Instant::now() + delay;
            if let Err(e) = entry.transition(ScheduleState::Idle) {
                error!(error = %e, "Could not reschedule site");
            }
            debug!(site = %site.id, delay = ?delay, "Rescheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::RelevanceCoordinator;
    use crate::testing::{test_site, MemoryBaselineStore, MockFetcher, RecordingNotifier};

    fn scheduler(sites: usize, max_concurrency: usize, max_enqueue: usize) -> Scheduler {
        let ctx = MonitorContext::builder()
            .fetcher(Arc::new(MockFetcher::new()))
            .store(Arc::new(MemoryBaselineStore::new()))
            .coordinator(RelevanceCoordinator::new(None))
            .notifier(Arc::new(RecordingNotifier::new()))
            .build();
        let config = SchedulerConfig {
            max_concurrency,
            stagger_window: Duration::ZERO,
            stagger_jitter: Duration::ZERO,
            tick: Duration::from_millis(10),
            max_enqueue_per_tick: max_enqueue,
        };
        let sites = (0..sites).map(|i| test_site(&format!("site-{i}"), &format!("https://{i}.example")));
        Scheduler::new(config, Arc::new(ctx), sites)
    }

    #[tokio::test]
    async fn dispatch_respects_per_tick_and_concurrency_limits() {
        let s = scheduler(5, 3, 2);
        let (tx, mut rx) = mpsc::channel(3);

        assert_eq!(s.dispatch(&tx).await, 2);
        assert_eq!(s.dispatch(&tx).await, 1);
        assert_eq!(s.dispatch(&tx).await, 0);

        let queued = s
            .snapshot()
            .await
            .iter()
            .filter(|e| e.state == ScheduleState::Queued)
            .count();
        assert_eq!(queued, 3);

        let mut seen = Vec::new();
        while let Ok(idx) = rx.try_recv() {
            seen.push(idx);
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn dispatch_ignores_sites_not_yet_due() {
        let s = scheduler(2, 2, 2);
        {
            let mut entries = s.entries.lock().await;
            entries[1].next_run = Instant::now() + Duration::from_secs(3600);
        }
        let (tx, _rx) = mpsc::channel(2);

        assert_eq!(s.dispatch(&tx).await, 1);
        let snapshot = s.snapshot().await;
        assert_eq!(snapshot[0].state, ScheduleState::Queued);
        assert_eq!(snapshot[1].state, ScheduleState::Idle);
    }

    #[tokio::test]
    async fn zero_limits_are_clamped() {
        let s = scheduler(1, 0, 0);
        assert_eq!(s.config().max_concurrency, 1);
        assert_eq!(s.config().max_enqueue_per_tick, 1);
    }

    #[test]
    fn stats_display() {
        let stats = SchedulerStats {
            cycles: 4,
            failures: 1,
            peak_concurrency: 3,
        };
        assert_eq!(stats.to_string(), "cycles=4 failures=1 peak_concurrency=3");
    }
}
