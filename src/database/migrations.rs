use crate::error::Result;
use sqlx::{Executor, SqlitePool};
use tracing::info;

/// Run all database migrations
///
/// Called once during startup; nothing in the crate migrates implicitly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create migrations table if not exists
    create_migrations_table(pool).await?;

    // Run each migration in order
    let migrations = get_migrations();

    for (version, name, sql) in migrations {
        if !is_migration_applied(pool, version).await? {
            info!(version = version, name = name, "Applying migration");

            let mut tx = pool.begin().await?;
            (&mut *tx).execute(sql).await?;
            sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
                .bind(version)
                .bind(name)
                .bind(chrono::Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!(version = version, name = name, "Migration applied successfully");
        }
    }

    Ok(())
}

/// Versions already recorded in `schema_migrations`, ascending
pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i32>> {
    create_migrations_table(pool).await?;

    let versions =
        sqlx::query_scalar::<_, i32>("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;

    Ok(versions)
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check if a migration has been applied
async fn is_migration_applied(pool: &SqlitePool, version: i32) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
    )
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(result > 0)
}

/// Get all migrations in order
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![
        (1, "initial_schema", MIGRATION_001_INITIAL_SCHEMA),
        (2, "proxy_indexes", MIGRATION_002_PROXY_INDEXES),
    ]
}

// Migration 1: proxies, provider request ledger and their association
const MIGRATION_001_INITIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proxies (
    id TEXT PRIMARY KEY NOT NULL,
    votes INTEGER NOT NULL DEFAULT 0,
    country TEXT,
    protocol TEXT NOT NULL DEFAULT 'http',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS provider_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    request_id TEXT NOT NULL,
    results INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    CONSTRAINT unique_provider_request UNIQUE (provider, request_id)
);

CREATE TABLE IF NOT EXISTS proxy_provider_requests (
    proxy_id TEXT NOT NULL REFERENCES proxies(id),
    provider_request_id INTEGER NOT NULL REFERENCES provider_requests(id),
    PRIMARY KEY (proxy_id, provider_request_id)
);

CREATE INDEX IF NOT EXISTS idx_proxy_provider_requests_request
    ON proxy_provider_requests(provider_request_id);
"#;

// Migration 2: indexes for selection filters
const MIGRATION_002_PROXY_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_proxies_votes ON proxies(votes DESC);
CREATE INDEX IF NOT EXISTS idx_proxies_country ON proxies(country);
CREATE INDEX IF NOT EXISTS idx_proxies_protocol ON proxies(protocol);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn test_migrations_apply_in_order() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();

        assert_eq!(applied_versions(db.pool()).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();

        assert_eq!(applied_versions(db.pool()).await.unwrap(), vec![1, 2]);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "provider_requests",
                "proxies",
                "proxy_provider_requests",
                "schema_migrations"
            ]
        );
    }

    #[tokio::test]
    async fn test_no_tables_before_migrations() {
        let db = Database::in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'proxies'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
