use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pagewatch_common::Baseline;

use super::{BaselineStore, StoreError};

/// Baselines in the `site_baselines` table, one row per site.
pub struct PgBaselineStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct BaselineRow {
    fingerprint: String,
    text: String,
    last_checked: DateTime<Utc>,
}

impl From<BaselineRow> for Baseline {
    fn from(row: BaselineRow) -> Self {
        Baseline {
            fingerprint: row.fingerprint,
            text: row.text,
            last_checked: row.last_checked,
        }
    }
}

impl PgBaselineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for PgBaselineStore {
    async fn read(&self, site_id: &str) -> Result<Option<Baseline>, StoreError> {
        let row = sqlx::query_as::<_, BaselineRow>(
            "SELECT fingerprint, text, last_checked FROM site_baselines WHERE site_id = $1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Baseline::from))
    }

    async fn write(&self, site_id: &str, baseline: &Baseline) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO site_baselines (site_id, fingerprint, text, last_checked)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (site_id)
             DO UPDATE SET fingerprint = EXCLUDED.fingerprint,
                          text = EXCLUDED.text,
                          last_checked = EXCLUDED.last_checked",
        )
        .bind(site_id)
        .bind(&baseline.fingerprint)
        .bind(&baseline.text)
        .bind(baseline.last_checked)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
