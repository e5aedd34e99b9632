use async_trait::async_trait;
use tracing::warn;

use pagewatch_common::Notice;

use super::backend::NotifyBackend;
use super::webhook::WebhookBackend;

/// Routes notices to an alerts backend or an errors backend.
/// Delivery failures are logged and swallowed so they never fail a job.
pub struct NotifyRouter {
    alerts_backend: Box<dyn NotifyBackend>,
    errors_backend: Box<dyn NotifyBackend>,
}

impl NotifyRouter {
    pub fn new(
        alerts_backend: Box<dyn NotifyBackend>,
        errors_backend: Box<dyn NotifyBackend>,
    ) -> Self {
        Self {
            alerts_backend,
            errors_backend,
        }
    }

    /// Build a router from webhook URLs.
    ///
    /// - `webhook_url`: relevant, loose and baseline notices
    /// - `error_webhook_url`: error notices (falls back to `webhook_url`)
    pub fn from_urls(webhook_url: Option<&str>, error_webhook_url: Option<&str>) -> Option<Self> {
        let alerts_url = webhook_url?.to_string();
        let errors_url = error_webhook_url
            .map(String::from)
            .unwrap_or_else(|| alerts_url.clone());

        Some(Self::new(
            Box::new(WebhookBackend::new(alerts_url)),
            Box::new(WebhookBackend::new(errors_url)),
        ))
    }
}

#[async_trait]
impl NotifyBackend for NotifyRouter {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()> {
        let backend = if notice.kind.is_error() {
            &self.errors_backend
        } else {
            &self.alerts_backend
        };

        if let Err(e) = backend.send(notice).await {
            warn!(error = %e, site = %notice.site_id, kind = %notice.kind, "Failed to send notification");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pagewatch_common::{NoticeKind, SiteConfig};

    use crate::testing::RecordingNotifier;

    struct Shared(Arc<RecordingNotifier>);

    #[async_trait]
    impl NotifyBackend for Shared {
        async fn send(&self, notice: &Notice) -> anyhow::Result<()> {
            self.0.send(notice).await
        }
    }

    #[tokio::test]
    async fn errors_go_to_error_backend() {
        let alerts = Arc::new(RecordingNotifier::new());
        let errors = Arc::new(RecordingNotifier::new());
        let router = NotifyRouter::new(
            Box::new(Shared(alerts.clone())),
            Box::new(Shared(errors.clone())),
        );
        let site = SiteConfig::new("a", "https://a.example");

        router.send(&Notice::new(NoticeKind::Relevant, &site)).await.unwrap();
        router.send(&Notice::new(NoticeKind::Error, &site)).await.unwrap();

        assert_eq!(alerts.count(NoticeKind::Relevant), 1);
        assert_eq!(alerts.count(NoticeKind::Error), 0);
        assert_eq!(errors.count(NoticeKind::Error), 1);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let router = NotifyRouter::new(
            Box::new(RecordingNotifier::failing()),
            Box::new(RecordingNotifier::failing()),
        );
        let site = SiteConfig::new("a", "https://a.example");

        assert!(router.send(&Notice::new(NoticeKind::Loose, &site)).await.is_ok());
    }

    #[test]
    fn no_webhook_means_no_router() {
        assert!(NotifyRouter::from_urls(None, Some("https://hooks.example/err")).is_none());
        assert!(NotifyRouter::from_urls(Some("https://hooks.example/a"), None).is_some());
    }
}
