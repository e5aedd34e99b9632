use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use pagewatch_common::{MonitorConfig, SiteConfig, WaitStrategy};

use crate::notify::backend::NotifyBackend;
use crate::relevance::RelevanceCoordinator;
use crate::store::BaselineStore;
use crate::throttle::ErrorThrottle;
use crate::traits::{FetchRequest, PageFetcher};

/// Per-job tunables shared by every site.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub fetch_timeout: Duration,
    pub retry_delay: Duration,
    pub wait: WaitStrategy,
    pub notify_on_baseline: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            wait: WaitStrategy::default(),
            notify_on_baseline: false,
        }
    }
}

impl JobSettings {
    pub fn from_monitor(monitor: &MonitorConfig) -> Self {
        Self {
            fetch_timeout: Duration::from_secs(monitor.fetch_timeout_secs),
            retry_delay: Duration::from_secs(monitor.retry_delay_secs),
            wait: monitor.wait,
            notify_on_baseline: monitor.notify_on_baseline,
        }
    }

    /// Site overrides applied on top of the process defaults.
    pub fn fetch_request(&self, site: &SiteConfig) -> FetchRequest {
        FetchRequest {
            url: site.url.clone(),
            selector: site.selector.clone(),
            timeout: site
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.fetch_timeout),
            wait: site.wait.unwrap_or(self.wait),
        }
    }

    pub fn notify_on_baseline(&self, site: &SiteConfig) -> bool {
        site.notify_on_baseline.unwrap_or(self.notify_on_baseline)
    }
}

/// Everything a site job needs, built once at startup and shared by all workers.
#[derive(Clone, TypedBuilder)]
pub struct MonitorContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: Arc<dyn BaselineStore>,
    pub coordinator: RelevanceCoordinator,
    pub notifier: Arc<dyn NotifyBackend>,
    #[builder(default = Arc::new(ErrorThrottle::default()))]
    pub throttle: Arc<ErrorThrottle>,
    #[builder(default)]
    pub settings: JobSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_overrides_win() {
        let settings = JobSettings::default();
        let mut site = SiteConfig::new("a", "https://a.example");
        site.selector = "#slots".to_string();
        site.fetch_timeout_secs = Some(90);
        site.wait = Some(WaitStrategy::Load);
        site.notify_on_baseline = Some(true);

        let req = settings.fetch_request(&site);
        assert_eq!(req.selector, "#slots");
        assert_eq!(req.timeout, Duration::from_secs(90));
        assert_eq!(req.wait, WaitStrategy::Load);
        assert!(settings.notify_on_baseline(&site));
    }

    #[test]
    fn defaults_from_monitor_config() {
        let monitor = MonitorConfig {
            fetch_timeout_secs: 45,
            notify_on_baseline: true,
            ..MonitorConfig::default()
        };
        let settings = JobSettings::from_monitor(&monitor);
        let site = SiteConfig::new("a", "https://a.example");

        let req = settings.fetch_request(&site);
        assert_eq!(req.timeout, Duration::from_secs(45));
        assert_eq!(req.wait, WaitStrategy::NetworkIdle2);
        assert_eq!(settings.retry_delay, Duration::from_secs(2));
        assert!(settings.notify_on_baseline(&site));
    }
}
