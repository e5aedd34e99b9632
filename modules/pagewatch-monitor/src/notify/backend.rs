use async_trait::async_trait;

use pagewatch_common::Notice;

/// Pluggable notification backend for site events.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver one notice. Callers log failures and never retry.
    async fn send(&self, notice: &Notice) -> anyhow::Result<()>;
}
