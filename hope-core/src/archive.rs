//! Snapshot archive on top of the pooled durable store.
//!
//! Snapshots are stored as JSON under `snapshot:<hex>`; the `head` key holds
//! the hex of the newest persisted snapshot.

use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::{ChainRef, MemoryChain, Snapshot};
use crate::error::{Error, Result};
use crate::pool::{KeyValue, Pool, SqliteConnector};

const HEAD_KEY: &str = "head";

fn snapshot_key(id: &ChainRef) -> String {
    format!("snapshot:{}", id)
}

/// Persists snapshots and rebuilds a chain from them
#[derive(Clone)]
pub struct SnapshotArchive {
    pool: Pool<SqliteConnector>,
}

impl SnapshotArchive {
    pub fn new(pool: Pool<SqliteConnector>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<SqliteConnector> {
        &self.pool
    }

    /// Store `snapshot` and point `head` at it, unless a later generation
    /// is already the stored head
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let handle = self.pool.acquire().await?;
        let conn = handle.connection()?;

        let tx = conn.unchecked_transaction()?;
        store(&tx, snapshot)?;
        advance_head(&tx, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist `id` together with every ancestor not archived yet, oldest
    /// first, in one transaction. Returns the number of snapshots written.
    pub async fn persist_lineage(&self, chain: &MemoryChain, id: ChainRef) -> Result<usize> {
        let handle = self.pool.acquire().await?;
        let conn = handle.connection()?;

        let mut missing = Vec::new();
        for snapshot in chain.walk(id, usize::MAX)? {
            if conn.get(&snapshot_key(&snapshot.id))?.is_some() {
                break;
            }
            missing.push(snapshot);
        }
        let Some(newest) = missing.first() else {
            return Ok(0);
        };

        let tx = conn.unchecked_transaction()?;
        for snapshot in missing.iter().rev() {
            store(&tx, snapshot)?;
        }
        advance_head(&tx, newest)?;
        tx.commit()?;

        debug!(head = %newest.id, written = missing.len(), "Persisted snapshot lineage");
        Ok(missing.len())
    }

    pub async fn load(&self, id: &ChainRef) -> Result<Snapshot> {
        let handle = self.pool.acquire().await?;
        let bytes = handle
            .connection()?
            .get(&snapshot_key(id))?
            .ok_or_else(|| Error::not_found(format!("archived snapshot {}", id)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The persisted head, if anything has been persisted
    pub async fn head(&self) -> Result<Option<ChainRef>> {
        let handle = self.pool.acquire().await?;
        read_head(handle.connection()?)
    }

    /// Rebuild a chain from the persisted head back to genesis
    pub async fn restore(&self) -> Result<Arc<MemoryChain>> {
        let chain = Arc::new(MemoryChain::new());
        let Some(head) = self.head().await? else {
            return Ok(chain);
        };

        let mut lineage = Vec::new();
        let mut next = Some(head);
        while let Some(id) = next {
            let snapshot = self.load(&id).await?;
            if snapshot.id != id || !snapshot.is_consistent() {
                return Err(Error::invalid_input(format!(
                    "archived snapshot {} does not match its content",
                    id
                )));
            }
            next = snapshot.parent;
            lineage.push(snapshot);
        }

        let count = lineage.len();
        for snapshot in lineage.into_iter().rev() {
            chain.append(snapshot)?;
        }
        info!(head = %head, snapshots = count, "Restored memory chain");
        Ok(chain)
    }
}

fn store(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_vec(snapshot)?;
    conn.put(&snapshot_key(&snapshot.id), &json)?;
    debug!(id = %snapshot.id, bytes = json.len(), "Persisted snapshot");
    Ok(())
}

fn read_head(conn: &Connection) -> Result<Option<ChainRef>> {
    match conn.get(HEAD_KEY)? {
        Some(bytes) => {
            let hex = String::from_utf8(bytes)
                .map_err(|e| Error::invalid_input(format!("stored head is not UTF-8: {}", e)))?;
            Ok(Some(hex.parse()?))
        }
        None => Ok(None),
    }
}

/// Move `head` to `snapshot` unless the stored head is a later generation
fn advance_head(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    if let Some(current) = read_head(conn)? {
        if let Some(bytes) = conn.get(&snapshot_key(&current))? {
            let stored: Snapshot = serde_json::from_slice(&bytes)?;
            if stored.generation > snapshot.generation {
                return Ok(());
            }
        }
    }
    conn.put(HEAD_KEY, snapshot.id.to_hex().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::consolidation::{Capture, Thresholds, consolidate};
    use crate::types::MemoryItem;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn archive(dir: &TempDir) -> SnapshotArchive {
        let pool = Pool::new(
            SqliteConnector::new(dir.path().join("hope.db")),
            &PoolConfig::default(),
        )
        .unwrap();
        SnapshotArchive::new(pool)
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let now = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();

        let chain = MemoryChain::new();
        let th = Thresholds::default();
        for payload in ["first", "second", "third"] {
            let item = MemoryItem::new(payload, 0.9, now).unwrap();
            let out = consolidate(&chain, &[(&item, 0.9)], &th, Capture::default(), now).unwrap();
            archive.persist(out.snapshot().unwrap()).await.unwrap();
        }

        let restored = archive.restore().await.unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.head().unwrap(), chain.head().unwrap());
        let latest = restored.resolve(crate::chain::ChainTarget::Latest).unwrap();
        assert_eq!(latest.items.len(), 3);
    }

    #[tokio::test]
    async fn test_restore_empty() {
        let dir = TempDir::new().unwrap();
        let restored = archive(&dir).restore().await.unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let err = archive(&dir).load(&ChainRef::from_bytes([4; 16])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stale_persist_keeps_newer_head() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let now = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();

        let chain = MemoryChain::new();
        let th = Thresholds::default();
        let mut snapshots = Vec::new();
        for payload in ["first", "second"] {
            let item = MemoryItem::new(payload, 0.9, now).unwrap();
            let out = consolidate(&chain, &[(&item, 0.9)], &th, Capture::default(), now).unwrap();
            snapshots.push(out.snapshot().unwrap().clone());
        }

        archive.persist(&snapshots[1]).await.unwrap();
        archive.persist(&snapshots[0]).await.unwrap();
        assert_eq!(archive.head().await.unwrap(), Some(snapshots[1].id));
    }

    #[tokio::test]
    async fn test_persist_lineage_fills_gaps() {
        let dir = TempDir::new().unwrap();
        let archive = archive(&dir);
        let now = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();

        let chain = MemoryChain::new();
        let th = Thresholds::default();
        let mut last = None;
        for payload in ["first", "second", "third"] {
            let item = MemoryItem::new(payload, 0.9, now).unwrap();
            last = consolidate(&chain, &[(&item, 0.9)], &th, Capture::default(), now)
                .unwrap()
                .chain_ref();
        }
        let head = last.unwrap();

        assert_eq!(archive.persist_lineage(&chain, head).await.unwrap(), 3);
        assert_eq!(archive.persist_lineage(&chain, head).await.unwrap(), 0);

        let restored = archive.restore().await.unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.head().unwrap(), Some(head));
    }
}
