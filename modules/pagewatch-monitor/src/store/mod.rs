mod file;
mod postgres;

pub use file::FileBaselineStore;
pub use postgres::PgBaselineStore;

use async_trait::async_trait;
use thiserror::Error;

use pagewatch_common::Baseline;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("baseline io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("baseline encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("baseline database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("baseline migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Durable per-site baseline records. Sites are independent keys; callers
/// guarantee a single writer per key.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// `None` means the site has never been observed.
    async fn read(&self, site_id: &str) -> Result<Option<Baseline>, StoreError>;

    /// Atomically replace the site's record.
    async fn write(&self, site_id: &str, baseline: &Baseline) -> Result<(), StoreError>;
}
