//! Durable snapshots for the engine.

use chrono::{DateTime, Utc};
use tracing::info;

use super::HopeMemory;
use crate::archive::SnapshotArchive;
use crate::config::HopeConfig;
use crate::consolidation::Consolidation;
use crate::error::Result;
use crate::pool::{Pool, SqliteConnector};

impl HopeMemory {
    /// Engine over the SQLite store named by `config.pool`, with its chain
    /// restored from what was persisted there
    pub async fn open(config: HopeConfig) -> Result<Self> {
        config.validate()?;
        let pool = Pool::new(SqliteConnector::new(config.pool.database_path.clone()), &config.pool)?;
        let archive = SnapshotArchive::new(pool);
        let chain = archive.restore().await?;

        info!(
            path = %config.pool.database_path.display(),
            snapshots = chain.len(),
            "Opened memory store"
        );
        Ok(Self::with_chain(config, chain)?.with_archive(archive))
    }

    /// Persist consolidations through `archive`
    pub fn with_archive(mut self, archive: SnapshotArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn archive(&self) -> Option<&SnapshotArchive> {
        self.archive.as_ref()
    }

    /// [`consolidate`](Self::consolidate), then write the resulting head and
    /// any ancestors the archive is missing.
    ///
    /// Without an archive this is a plain consolidation.
    pub async fn consolidate_and_persist(&self, now: DateTime<Utc>) -> Result<Consolidation> {
        let outcome = self.consolidate(now)?;
        if let (Some(archive), Some(id)) = (&self.archive, outcome.chain_ref()) {
            archive.persist_lineage(&self.chain, id).await?;
        }
        Ok(outcome)
    }
}
