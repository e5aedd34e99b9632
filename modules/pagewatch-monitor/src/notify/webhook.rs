use ai_client::truncate_to_char_boundary;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use pagewatch_common::{Notice, NoticeKind};

use super::backend::NotifyBackend;

/// Slack rejects `text` above this many bytes.
const MAX_TEXT_BYTES: usize = 3500;

/// Slack-compatible incoming webhook.
pub struct WebhookBackend {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    fn kind_emoji(kind: NoticeKind) -> &'static str {
        match kind {
            NoticeKind::Relevant => ":rotating_light:",
            NoticeKind::Loose => ":eyes:",
            NoticeKind::Baseline => ":pushpin:",
            NoticeKind::Error => ":warning:",
        }
    }

    fn headline(kind: NoticeKind) -> &'static str {
        match kind {
            NoticeKind::Relevant => "Relevant change",
            NoticeKind::Loose => "Page changed",
            NoticeKind::Baseline => "Baseline recorded",
            NoticeKind::Error => "Check failed",
        }
    }

    pub(crate) fn render(notice: &Notice) -> String {
        let mut lines = vec![format!(
            "{} *{}: {}*",
            Self::kind_emoji(notice.kind),
            Self::headline(notice.kind),
            notice.site_name,
        )];
        lines.push(format!("<{}>", notice.url));
        if !notice.summary.is_empty() {
            lines.push(format!("*Summary:* {}", notice.summary));
        }
        if !notice.reason.is_empty() {
            lines.push(format!("*Reason:* {}", notice.reason));
        }
        lines.push(format!(
            "_{} at {}_",
            notice.site_id,
            notice.at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        truncate_to_char_boundary(&lines.join("\n"), MAX_TEXT_BYTES).to_string()
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("Webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for WebhookBackend {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()> {
        let payload = json!({
            "text": Self::render(notice),
            "unfurl_links": false,
        });

        self.post(payload).await
    }
}
