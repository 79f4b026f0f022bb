//! SQLite-backed durable store.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use super::Connector;
use crate::error::Result;

/// Opens SQLite connections with WAL journaling and a `kv` table
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for SqliteConnector {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-8000;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );",
        )?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> bool {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|one| one == 1)
            .unwrap_or(false)
    }
}

/// Minimal key-value access to the durable store
pub trait KeyValue {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

impl KeyValue for Connection {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::Pool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_through_pool() {
        let dir = TempDir::new().unwrap();
        let connector = SqliteConnector::new(dir.path().join("hope.db"));
        let pool = Pool::new(connector, &PoolConfig::default()).unwrap();

        let handle = pool.acquire().await.unwrap();
        let conn = handle.connection().unwrap();
        assert_eq!(conn.get("missing").unwrap(), None);

        conn.put("greeting", b"hello").unwrap();
        conn.put("greeting", b"hello again").unwrap();
        assert_eq!(conn.get("greeting").unwrap().as_deref(), Some(&b"hello again"[..]));
    }

    #[tokio::test]
    async fn test_values_visible_across_connections() {
        let dir = TempDir::new().unwrap();
        let config = PoolConfig {
            max_size: 2,
            min_idle: 0,
            ..PoolConfig::default()
        };
        let pool = Pool::new(SqliteConnector::new(dir.path().join("hope.db")), &config).unwrap();

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        a.connection().unwrap().put("k", b"v").unwrap();
        assert_eq!(b.connection().unwrap().get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_liveness_check() {
        let dir = TempDir::new().unwrap();
        let connector = SqliteConnector::new(dir.path().join("hope.db"));
        let mut conn = connector.connect().unwrap();
        assert!(connector.is_valid(&mut conn));
    }
}
