use crate::config::DatabaseConfig;
use crate::error::{ProxyDbError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::Engine;

/// How long a writer waits for the store's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    engine: Engine,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let engine = Engine::from_url(&config.url);
        if engine != Engine::Sqlite {
            return Err(ProxyDbError::DatabaseConnection(format!(
                "unsupported database engine: {}",
                engine
            )));
        }

        if let Some(file) = sqlite_file(&config.url) {
            if let Some(parent) = Path::new(file).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        info!(url = %config.url, "Connecting to database");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| ProxyDbError::DatabaseConnection(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| ProxyDbError::DatabaseConnection(e.to_string()))?;

        info!("Database connection pool established");

        Ok(Database { pool, engine })
    }

    /// Private in-memory database
    ///
    /// The pool holds exactly one connection that never expires: every SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ProxyDbError::DatabaseConnection(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| ProxyDbError::DatabaseConnection(e.to_string()))?;

        Ok(Database {
            pool,
            engine: Engine::Sqlite,
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Engine used to compile engine-specific SQL
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Check if the database is healthy
    pub async fn health_check(&self) -> Result<Duration> {
        let start = std::time::Instant::now();

        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(start.elapsed())
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        super::migrations::run_migrations(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// File path of a file-backed SQLite URL, `None` for in-memory databases
fn sqlite_file(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_file() {
        assert_eq!(
            sqlite_file("sqlite:///var/lib/proxy-db/db.sqlite3?mode=rwc"),
            Some("/var/lib/proxy-db/db.sqlite3")
        );
        assert_eq!(sqlite_file("sqlite://db.sqlite3"), Some("db.sqlite3"));
        assert_eq!(sqlite_file("sqlite::memory:"), None);
        assert_eq!(sqlite_file("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_in_memory_health_check() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.health_check().await.is_ok());
        assert_eq!(db.engine(), &Engine::Sqlite);
    }

    #[tokio::test]
    async fn test_connect_rejects_other_engines() {
        let config = DatabaseConfig {
            url: "postgres://localhost/proxydb".to_string(),
            max_connections: 1,
        };
        let result = Database::connect(&config).await;
        assert!(matches!(result, Err(ProxyDbError::DatabaseConnection(_))));
    }
}
