use async_trait::async_trait;

use pagewatch_common::Notice;
use tracing::debug;

use super::backend::NotifyBackend;

/// Drops notices. Used when no webhook is configured.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()> {
        debug!(site = %notice.site_id, kind = %notice.kind, "Notice dropped (no webhook)");
        Ok(())
    }
}
