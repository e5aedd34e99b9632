use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use pagewatch_common::Baseline;

use super::{BaselineStore, StoreError};

/// One JSON document per site under a directory.
pub struct FileBaselineStore {
    dir: PathBuf,
}

impl FileBaselineStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, site_id: &str) -> PathBuf {
        self.dir.join(format!("{site_id}.json"))
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn read(&self, site_id: &str) -> Result<Option<Baseline>, StoreError> {
        match tokio::fs::read(self.path_for(site_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, site_id: &str, baseline: &Baseline) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(baseline)?;
        let dir = self.dir.clone();
        let target = self.path_for(site_id);

        // Write to a sibling temp file, then rename over the old record.
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!(site = %site_id, fingerprint = %baseline.fingerprint, "Baseline written");
        Ok(())
    }
}
