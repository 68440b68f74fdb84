//! SQLite persistence shared by every plugin.
//!
//! Connections come from an `r2d2` pool.  All SQLite work is blocking, so it runs on tokio's
//! blocking thread pool via [`Database::with_conn`].

mod counter;
mod messages;

pub use counter::{BulkOutcome, CounterStore, CounterTable, ECONOMY, LEVELS};
pub use messages::{LoggedMessage, MessageLog};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::{path::Path, time::Duration};

pub type ConnectionPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS levels (
        user_id INTEGER PRIMARY KEY,
        exp     INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS economy (
        user_id INTEGER PRIMARY KEY,
        balance INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS messages (
        message_id INTEGER PRIMARY KEY,
        author_id  INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        content    TEXT    NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS messages_created_at ON messages (created_at);
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA journal_mode = WAL;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

/// Handle to the bot's database.  Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn open(path: &Path, pool_size: u32, busy_timeout_ms: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = tokio::task::spawn_blocking(move || {
            Pool::builder()
                .max_size(pool_size)
                .connection_timeout(Duration::from_secs(5))
                .connection_customizer(Box::new(PragmaCustomizer { busy_timeout_ms }))
                .build(manager)
        })
        .await??;

        let db = Self { pool };
        db.with_conn(|conn| Ok(conn.execute_batch(SCHEMA)?)).await?;
        Ok(db)
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }
}
