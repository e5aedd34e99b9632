use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// At most one error notification per site per window.
pub struct ErrorThrottle {
    window: Duration,
    last_error: Mutex<HashMap<String, Instant>>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_error: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns false (and arms the throttle) for the first error in a window,
    /// true for every later error inside it.
    pub fn should_throttle(&self, site_id: &str) -> bool {
        self.should_throttle_at(site_id, Instant::now())
    }

    pub fn should_throttle_at(&self, site_id: &str, now: Instant) -> bool {
        let mut entries = self.entries();
        match entries.get(site_id) {
            Some(last) if now.saturating_duration_since(*last) < self.window => true,
            _ => {
                entries.insert(site_id.to_string(), now);
                false
            }
        }
    }

    /// Drop entries older than the window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, last| now.saturating_duration_since(*last) < self.window);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep every `every` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        debug!(removed, remaining = self.len(), "Error throttle sweep");
                    }
                }
            }
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_passes_second_is_suppressed() {
        let throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        assert!(!throttle.should_throttle_at("a", t0));
        assert!(throttle.should_throttle_at("a", t0 + Duration::from_secs(60)));
        assert!(throttle.should_throttle_at("a", t0 + Duration::from_secs(599)));
    }

    #[test]
    fn sites_are_independent() {
        let throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        assert!(!throttle.should_throttle_at("a", t0));
        assert!(!throttle.should_throttle_at("b", t0));
        assert!(throttle.should_throttle_at("a", t0));
    }

    #[test]
    fn window_expiry_rearms() {
        let throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        assert!(!throttle.should_throttle_at("a", t0));
        let later = t0 + DEFAULT_WINDOW + Duration::from_secs(1);
        assert!(!throttle.should_throttle_at("a", later));
        assert!(throttle.should_throttle_at("a", later + Duration::from_secs(1)));
    }

    #[test]
    fn suppressed_errors_do_not_extend_window() {
        let throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        assert!(!throttle.should_throttle_at("a", t0));
        assert!(throttle.should_throttle_at("a", t0 + Duration::from_secs(500)));
        assert!(!throttle.should_throttle_at("a", t0 + Duration::from_secs(601)));
    }

    #[test]
    fn sweep_removes_stale_entries_only() {
        let throttle = ErrorThrottle::default();
        let t0 = Instant::now();

        throttle.should_throttle_at("old", t0);
        throttle.should_throttle_at("fresh", t0 + Duration::from_secs(550));

        let removed = throttle.sweep_at(t0 + Duration::from_secs(700));
        assert_eq!(removed, 1);
        assert_eq!(throttle.len(), 1);
        assert!(throttle.should_throttle_at("fresh", t0 + Duration::from_secs(700)));
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let throttle = Arc::new(ErrorThrottle::new(Duration::from_millis(10)));
        throttle.should_throttle("a");

        let shutdown = CancellationToken::new();
        let handle = throttle
            .clone()
            .spawn_sweeper(Duration::from_millis(20), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(throttle.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
