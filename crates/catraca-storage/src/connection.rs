//! SQLite pool setup, pragmas and embedded migrations.
//!
//! One [`Database`] is opened at daemon startup and shared by all
//! repositories. WAL journaling lets staff inspect the file with the
//! sqlite3 shell while a cycle is writing, and the busy timeout rides
//! out the lock collisions that such a reader can cause.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{StorageError, StorageResult};

/// How long a statement waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the attendance database
///
/// The defaults fit the daemon: a small pool, the file created on first
/// run next to the binary, schema migrated as part of opening.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Upper bound on pooled connections
    pub max_connections: u32,

    /// How long acquiring a connection from the pool may take
    pub acquire_timeout: Duration,

    /// Create the database file when it does not exist yet
    pub create_if_missing: bool,

    /// Apply pending migrations while opening
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "catraca.db".to_string(),
            // One scheduler cycle writes at a time; five covers the
            // cycle plus ad-hoc readers comfortably.
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for the given database file, defaults elsewhere.
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Override the pool size.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Disable (or re-enable) migration on open.
    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }
}

/// Shared handle to the attendance database
///
/// Clones share the pool, so every repository built from the same
/// `Database` sees the same data.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and if needed create and migrate) the database.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use catraca_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("catraca.db")).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the parent directory cannot be created, the
    /// path does not form a valid SQLite URL, the pool fails to connect
    /// or a pending migration fails.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!("Cannot create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database_path))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {e}")))?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let database = Self { pool };

        if config.auto_migrate {
            database.migrate().await?;
        }

        Ok(database)
    }

    /// Open a migrated in-memory database for tests.
    ///
    /// `sqlite::memory:` gives every new connection its own blank
    /// database, so the pool is pinned to a single connection; all
    /// repositories cloned from this handle share that one.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.migrate().await?;

        Ok(database)
    }

    /// Bring the schema up to date.
    ///
    /// Migrations are embedded into the binary at compile time by
    /// `sqlx::migrate!`; upgrading the daemon and restarting it applies
    /// whatever is pending, and re-running is a no-op.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for building repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Round-trip a trivial query to verify the database is reachable.
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
