use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PageWatchError;
use crate::types::{RelevanceMode, SiteConfig, WaitStrategy};

/// Upper bound for any configured interval: one week.
pub const MAX_INTERVAL_MINUTES: f64 = 7.0 * 24.0 * 60.0;

fn within_interval_cap(minutes: f64) -> bool {
    minutes.is_finite() && (0.0..=MAX_INTERVAL_MINUTES).contains(&minutes)
}

/// Site ids double as file names for the file baseline store.
fn is_valid_site_id(id: &str) -> bool {
    !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// TOML-backed configuration loaded from disk.
/// Secrets (API keys, webhook URLs, DB URL) stay as env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// Process-wide tunables. Every key has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub max_concurrency: usize,
    /// Spread of first runs after startup, minutes.
    pub stagger_window_minutes: f64,
    pub stagger_jitter_secs: f64,
    pub tick_secs: u64,
    /// Defaults to `max_concurrency`.
    pub max_enqueue_per_tick: Option<usize>,
    pub classifier_char_budget: usize,
    pub classifier_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub error_throttle_minutes: u64,
    pub notify_on_baseline: bool,
    pub wait: WaitStrategy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            stagger_window_minutes: 2.0,
            stagger_jitter_secs: 5.0,
            tick_secs: 2,
            max_enqueue_per_tick: None,
            classifier_char_budget: 6000,
            classifier_timeout_secs: 60,
            fetch_timeout_secs: 30,
            retry_delay_secs: 2,
            error_throttle_minutes: 10,
            notify_on_baseline: false,
            wait: WaitStrategy::NetworkIdle2,
        }
    }
}

impl MonitorConfig {
    pub fn max_enqueue_per_tick(&self) -> usize {
        self.max_enqueue_per_tick.unwrap_or(self.max_concurrency)
    }

    pub fn stagger_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.stagger_window_minutes * 60.0).unwrap_or(Duration::ZERO)
    }

    pub fn stagger_jitter(&self) -> Duration {
        Duration::try_from_secs_f64(self.stagger_jitter_secs).unwrap_or(Duration::ZERO)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn error_throttle_window(&self) -> Duration {
        Duration::from_secs(self.error_throttle_minutes.saturating_mul(60))
    }
}

impl FileConfig {
    /// Structural checks that must pass before the process starts.
    pub fn validate(&self) -> Result<(), PageWatchError> {
        if self.monitor.max_concurrency < 1 {
            return Err(PageWatchError::Config(
                "monitor.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.monitor.max_enqueue_per_tick == Some(0) {
            return Err(PageWatchError::Config(
                "monitor.max_enqueue_per_tick must be at least 1".to_string(),
            ));
        }
        if !within_interval_cap(self.monitor.stagger_window_minutes) {
            return Err(PageWatchError::Config(format!(
                "monitor.stagger_window_minutes must be between 0 and {MAX_INTERVAL_MINUTES} (got {})",
                self.monitor.stagger_window_minutes
            )));
        }
        if !within_interval_cap(self.monitor.stagger_jitter_secs / 60.0) {
            return Err(PageWatchError::Config(format!(
                "monitor.stagger_jitter_secs must be between 0 and {} (got {})",
                MAX_INTERVAL_MINUTES * 60.0,
                self.monitor.stagger_jitter_secs
            )));
        }
        if self.monitor.error_throttle_minutes as f64 > MAX_INTERVAL_MINUTES {
            return Err(PageWatchError::Config(format!(
                "monitor.error_throttle_minutes must be at most {MAX_INTERVAL_MINUTES} (got {})",
                self.monitor.error_throttle_minutes
            )));
        }
        if self.sites.is_empty() {
            return Err(PageWatchError::Config("no [[sites]] configured".to_string()));
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !is_valid_site_id(&site.id) {
                return Err(PageWatchError::Config(format!(
                    "site id '{}' may only contain letters, digits, '_', '.' and '-'",
                    site.id
                )));
            }
            if !seen.insert(site.id.as_str()) {
                return Err(PageWatchError::Config(format!(
                    "duplicate site id '{}'",
                    site.id
                )));
            }
            if site.url.trim().is_empty() {
                return Err(PageWatchError::Config(format!(
                    "site '{}' has an empty url",
                    site.id
                )));
            }
            if !(site.check_min > 0.0)
                || site.check_min > site.check_max
                || !within_interval_cap(site.check_max)
            {
                return Err(PageWatchError::Config(format!(
                    "site '{}' needs 0 < check_min <= check_max <= {MAX_INTERVAL_MINUTES} (got {} / {})",
                    site.id, site.check_min, site.check_max
                )));
            }
        }

        Ok(())
    }

    /// Strict sites cannot run without a classifier.
    pub fn require_classifier(&self, has_classifier: bool) -> Result<(), PageWatchError> {
        if has_classifier {
            return Ok(());
        }
        let strict: Vec<&str> = self
            .sites
            .iter()
            .filter(|s| s.relevance_mode == RelevanceMode::Strict)
            .map(|s| s.id.as_str())
            .collect();
        if strict.is_empty() {
            Ok(())
        } else {
            Err(PageWatchError::Config(format!(
                "ANTHROPIC_API_KEY is required for strict sites: {}",
                strict.join(", ")
            )))
        }
    }

    pub fn site(&self, id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id == id)
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r##"
        [monitor]
        max_concurrency = 2
        stagger_window_minutes = 1.5

        [[sites]]
        id = "bistro"
        name = "Bistro Central"
        url = "https://example.com/bistro"
        selector = "#availability"
        check_min = 3
        check_max = 6
        goal = { description = "dinner for two", keywords = ["available", "book now"], negative_hints = ["waitlist"] }
        scrub_patterns = [{ pattern = "\\d+ people viewing", flags = "i" }]

        [[sites]]
        id = "museum"
        url = "https://example.com/tickets"
        check_min = 10
        check_max = 20
        relevance_mode = "loose"
        wait = "load"
    "##;

    fn parse(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn sample_parses_and_validates() {
        let config = parse(SAMPLE);
        config.validate().unwrap();

        assert_eq!(config.monitor.max_concurrency, 2);
        assert_eq!(config.monitor.max_enqueue_per_tick(), 2);
        assert_eq!(config.monitor.classifier_char_budget, 6000);
        assert_eq!(config.monitor.stagger_window(), Duration::from_secs(90));
        assert_eq!(config.sites.len(), 2);

        let museum = config.site("museum").unwrap();
        assert_eq!(museum.relevance_mode, RelevanceMode::Loose);
        assert_eq!(museum.wait, Some(WaitStrategy::Load));

        let bistro = config.site("bistro").unwrap();
        assert_eq!(bistro.scrub_patterns[0].flags, "i");
        assert_eq!(bistro.goal.keywords.len(), 2);
    }

    #[test]
    fn empty_sites_rejected() {
        let config = parse("[monitor]\nmax_concurrency = 1\n");
        assert!(matches!(config.validate(), Err(PageWatchError::Config(_))));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let config = parse(
            r#"
            [[sites]]
            id = "a"
            url = "https://a"
            check_min = 1
            check_max = 2
            [[sites]]
            id = "a"
            url = "https://b"
            check_min = 1
            check_max = 2
            "#,
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"), "{err}");
    }

    #[test]
    fn path_like_id_rejected() {
        let config = parse(
            r#"
            [[sites]]
            id = "../etc"
            url = "https://a"
            check_min = 1
            check_max = 2
            "#,
        );
        assert!(config.validate().is_err());
        assert!(!is_valid_site_id(".."));
        assert!(is_valid_site_id("cafe-1.v2_b"));
    }

    #[test]
    fn inverted_cadence_rejected() {
        let config = parse(
            r#"
            [[sites]]
            id = "a"
            url = "https://a"
            check_min = 5
            check_max = 2
            "#,
        );
        assert!(config.validate().is_err());

        let zero = parse(
            r#"
            [[sites]]
            id = "a"
            url = "https://a"
            check_min = 0
            check_max = 2
            "#,
        );
        assert!(zero.validate().is_err());
    }

    #[test]
    fn non_finite_or_huge_cadence_rejected() {
        for check_max in ["inf", "nan", "1e300", "20000"] {
            let config = parse(&format!(
                "[[sites]]\nid = \"a\"\nurl = \"https://a\"\ncheck_min = 1\ncheck_max = {check_max}\n"
            ));
            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("check_max"), "{check_max}: {err}");
        }

        let week = parse(
            "[[sites]]\nid = \"a\"\nurl = \"https://a\"\ncheck_min = 1\ncheck_max = 10080\n",
        );
        assert!(week.validate().is_ok());
    }

    #[test]
    fn non_finite_monitor_intervals_rejected() {
        let mut config = parse(SAMPLE);
        config.monitor.stagger_window_minutes = f64::INFINITY;
        assert!(config.validate().is_err());
        assert_eq!(config.monitor.stagger_window(), Duration::ZERO);

        let mut config = parse(SAMPLE);
        config.monitor.stagger_jitter_secs = f64::NAN;
        assert!(config.validate().is_err());
        assert_eq!(config.monitor.stagger_jitter(), Duration::ZERO);

        let mut config = parse(SAMPLE);
        config.monitor.error_throttle_minutes = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.monitor.error_throttle_window(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = parse(SAMPLE);
        config.monitor.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn strict_sites_need_classifier() {
        let config = parse(SAMPLE);
        let err = config.require_classifier(false).unwrap_err().to_string();
        assert!(err.contains("bistro"));
        assert!(!err.contains("museum"));
        assert!(config.require_classifier(true).is_ok());
    }

    #[test]
    fn unknown_monitor_key_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[monitor]\nmax_concurency = 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sites[0].display_name(), "Bistro Central");
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/pagewatch.example.toml");
        let config = load_config(&path).unwrap();
        config.validate().unwrap();

        let bistro = config.site("bistro-friday").unwrap();
        assert_eq!(bistro.goal.party_size, Some(2));
        assert!(bistro.goal.target_date.is_some());
        assert_eq!(config.site("museum-tickets").unwrap().notify_on_baseline, Some(true));
    }

    #[test]
    fn load_config_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/pagewatch.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
