//! `SQLite` connection pooling.
//!
//! `r2d2` pool over `r2d2_sqlite`. Every new connection gets WAL mode,
//! foreign keys, a busy timeout, and `synchronous = NORMAL` via a pool
//! customizer. In-memory pools use a uniquely named shared-cache database
//! so all pooled connections see the same data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::errors::Result;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool configuration.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size.
    pub pool_size: u32,
    /// `PRAGMA busy_timeout`, in milliseconds.
    pub busy_timeout_ms: u32,
    /// `PRAGMA cache_size`, in KiB.
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5_000,
            cache_size_kib: 8_192,
        }
    }
}

/// Applies the session pragmas on every new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        Ok(())
    }
}

fn build_pool(manager: SqliteConnectionManager, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Create an in-memory pool (tests and ephemeral sessions).
///
/// Each call gets its own database; connections within one pool share it
/// via `cache=shared`.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);
    let n = NEXT_DB.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:strand_mem_{n}?mode=memory&cache=shared");
    let manager = SqliteConnectionManager::file(uri).with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI,
    );
    build_pool(manager, config)
}

/// Create a file-backed pool.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build_pool(SqliteConnectionManager::file(path), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_applies_pragmas() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let foreign_keys: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn in_memory_connections_share_one_database() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (42);")
                .unwrap();
        }
        let conn_a = pool.get().unwrap();
        let conn_b = pool.get().unwrap();
        let x: i64 = conn_b.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        drop(conn_a);
        assert_eq!(x, 42);
    }

    #[test]
    fn separate_in_memory_pools_are_isolated() {
        let pool_a = new_in_memory(&ConnectionConfig::default()).unwrap();
        let pool_b = new_in_memory(&ConnectionConfig::default()).unwrap();
        pool_a
            .get()
            .unwrap()
            .execute_batch("CREATE TABLE only_a (x INTEGER);")
            .unwrap();
        let exists: i64 = pool_b
            .get()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'only_a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(exists, 0);
    }

    #[test]
    fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let pool = new_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn custom_pool_size() {
        let config = ConnectionConfig {
            pool_size: 2,
            ..ConnectionConfig::default()
        };
        let pool = new_in_memory(&config).unwrap();
        assert_eq!(pool.max_size(), 2);
    }
}
