//! Database connection pool management

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::jewelry::{JewelryRepository, JewelryService};
use crate::pool_health::DatabasePoolHealth;
use crate::repository::{RecordStore, TableSpec};
use crate::schema;

/// Create a SQLite connection pool with retry logic
///
/// Foreign keys are enforced on every connection, the journal runs in WAL
/// mode and a missing database file is created.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    create_pool_with_retries(config, config.max_retries).await
}

/// Create a pool with configurable retries
///
/// Uses exponential backoff strategy for retries
async fn create_pool_with_retries(config: &DatabaseConfig, max_retries: u32) -> Result<SqlitePool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Database connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Database connection pool created: max={}, min={}",
                        config.max_connections,
                        config.min_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = retry_delay(base_delay, attempt);

                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Upper bound on the wait between connection attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff for the given 1-based attempt, capped at [`MAX_RETRY_DELAY`]
fn retry_delay(base_delay: Duration, attempt: u32) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base_delay.saturating_mul(multiplier).min(MAX_RETRY_DELAY)
}

/// Attempt to create a database pool (single try)
async fn try_create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| Error::Internal(format!("Invalid database URL '{}': {}", config.url, e)))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout());

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout())
        .connect_with(options)
        .await
        .map_err(|e| {
            Error::Internal(format!(
                "Failed to open database at '{}': {}\n\n\
                Troubleshooting:\n\
                1. Check the URL format: sqlite://path/to/file.db\n\
                2. Verify the parent directory exists and is writable\n\
                3. Make sure no other process holds an exclusive lock\n\n\
                Original error: {}",
                config.url,
                categorize_db_error(&e),
                e
            ))
        })
}

/// Categorize database error for better user guidance
fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database error",
        Error::Io(_) => "File I/O error - check path and permissions",
        Error::PoolTimedOut => "Connection pool timeout - database may be locked",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Connection error",
    }
}

/// Entry point for application services
///
/// Owns the pool and hands out stores for the simple entities plus the
/// jewelry repository and service. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    /// Open the pool and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        schema::initialize(&pool).await?;
        Ok(Self::from_pool(pool, config.clone()))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool, config: DatabaseConfig) -> Self {
        Self { pool, config }
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store for any table following the default column conventions
    pub fn records(&self, table: &str) -> RecordStore {
        self.store(TableSpec::new(table))
    }

    /// Store for a table with custom conventions
    pub fn store(&self, table: TableSpec) -> RecordStore {
        RecordStore::new(self.pool.clone(), table)
            .with_operation_timeout(self.config.operation_timeout())
    }

    /// Shop staff accounts
    pub fn users(&self) -> RecordStore {
        self.records("users")
    }

    /// Suppliers
    pub fn vendors(&self) -> RecordStore {
        self.records("vendors")
    }

    /// Product categories
    pub fn categories(&self) -> RecordStore {
        self.records("categories")
    }

    /// Metals and their rates
    pub fn materials(&self) -> RecordStore {
        self.records("materials")
    }

    /// Jewelry + stones aggregate repository
    pub fn jewelry(&self) -> JewelryRepository {
        JewelryRepository::new(self.pool.clone())
            .with_operation_timeout(self.config.operation_timeout())
    }

    /// Jewelry application service
    pub fn jewelry_service(&self) -> JewelryService {
        JewelryService::new(self.jewelry())
    }

    /// Pool occupancy snapshot
    pub fn health(&self) -> DatabasePoolHealth {
        DatabasePoolHealth::from_pool(&self.pool, &self.config)
    }

    /// Close every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
