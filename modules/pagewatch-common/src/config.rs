use std::path::PathBuf;

use crate::error::PageWatchError;

const DEFAULT_CLASSIFIER_MODEL: &str = "claude-haiku-4-5-20251001";

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; sites and tunables
/// live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Fetching
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Classifier
    pub anthropic_api_key: Option<String>,
    pub classifier_model: String,

    // Notifications
    pub webhook_url: Option<String>,
    pub error_webhook_url: Option<String>,

    // Persistence
    pub database_url: Option<String>,
    pub baseline_dir: PathBuf,

    pub config_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PageWatchError> {
        dotenvy::dotenv().ok();
        let config = Self::from_vars(|key| std::env::var(key).ok())?;
        config.log_redacted();
        Ok(config)
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PageWatchError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            browserless_url: get("BROWSERLESS_URL").ok_or_else(|| {
                PageWatchError::Config("BROWSERLESS_URL environment variable is required".into())
            })?,
            browserless_token: get("BROWSERLESS_TOKEN"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            classifier_model: get("CLASSIFIER_MODEL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
            webhook_url: get("WEBHOOK_URL"),
            error_webhook_url: get("ERROR_WEBHOOK_URL"),
            database_url: get("DATABASE_URL"),
            baseline_dir: get("BASELINE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/baselines")),
            config_path: get("PAGEWATCH_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/pagewatch.toml")),
        })
    }

    /// Log config with secrets redacted.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  BROWSERLESS_URL: {}", self.browserless_url);
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview_opt(&self.anthropic_api_key));
        tracing::info!("  CLASSIFIER_MODEL: {}", self.classifier_model);
        tracing::info!("  WEBHOOK_URL: {}", preview_opt(&self.webhook_url));
        tracing::info!("  ERROR_WEBHOOK_URL: {}", preview_opt(&self.error_webhook_url));
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
        tracing::info!("  BASELINE_DIR: {}", self.baseline_dir.display());
        tracing::info!("  PAGEWATCH_CONFIG: {}", self.config_path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn browserless_url_is_required() {
        let env = vars(&[("ANTHROPIC_API_KEY", "sk-ant-xyz")]);
        let result = AppConfig::from_vars(|k| env.get(k).cloned());
        assert!(matches!(result, Err(PageWatchError::Config(_))));
    }

    #[test]
    fn defaults_fill_optional_values() {
        let env = vars(&[("BROWSERLESS_URL", "http://localhost:3000"), ("WEBHOOK_URL", "  ")]);
        let config = AppConfig::from_vars(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.browserless_url, "http://localhost:3000");
        assert_eq!(config.classifier_model, DEFAULT_CLASSIFIER_MODEL);
        assert_eq!(config.webhook_url, None);
        assert_eq!(config.baseline_dir, PathBuf::from("data/baselines"));
        assert_eq!(config.config_path, PathBuf::from("config/pagewatch.toml"));
    }

    #[test]
    fn explicit_values_win() {
        let env = vars(&[
            ("BROWSERLESS_URL", "http://chrome:3000"),
            ("CLASSIFIER_MODEL", "claude-sonnet-4-5"),
            ("BASELINE_DIR", "/var/lib/pagewatch"),
            ("DATABASE_URL", "postgres://localhost/pagewatch"),
        ]);
        let config = AppConfig::from_vars(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.classifier_model, "claude-sonnet-4-5");
        assert_eq!(config.baseline_dir, PathBuf::from("/var/lib/pagewatch"));
        assert!(config.database_url.is_some());
    }
}
