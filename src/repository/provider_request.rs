use crate::config::DEFAULT_STALE_MINUTES;
use crate::error::Result;
use crate::models::{LedgerEntry, ProviderRequest, RequestOptions};
use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

const SELECT_COLUMNS: &str =
    "SELECT id, provider, request_id, results, created_at, updated_at FROM provider_requests";

/// Repository for the provider request ledger
///
/// One row per (provider, request id); the uniqueness constraint makes every
/// write an upsert, so concurrent sessions never duplicate an entry.
#[derive(Clone)]
pub struct ProviderRequestRepository {
    pool: SqlitePool,
    stale_window: Duration,
}

impl ProviderRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            stale_window: Duration::minutes(DEFAULT_STALE_MINUTES),
        }
    }

    pub fn with_stale_window(mut self, window: Duration) -> Self {
        self.stale_window = window;
        self
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    /// Get the entry for a provider and option set, if any
    pub async fn get(
        &self,
        provider: &str,
        options: &RequestOptions,
    ) -> Result<Option<ProviderRequest>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_with(&mut conn, provider, &options.request_id()).await
    }

    /// Find the entry, creating an empty never-run entry when missing
    pub async fn get_or_create(
        &self,
        provider: &str,
        options: &RequestOptions,
    ) -> Result<LedgerEntry> {
        let mut conn = self.pool.acquire().await?;
        Self::get_or_create_with(&mut conn, provider, &options.request_id(), Utc::now()).await
    }

    /// Whether the provider should be polled again with these options
    pub async fn requires_update(&self, provider: &str, options: &RequestOptions) -> Result<bool> {
        self.requires_update_at(provider, options, Utc::now()).await
    }

    pub async fn requires_update_at(
        &self,
        provider: &str,
        options: &RequestOptions,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let entry = self.get_or_create(provider, options).await?;
        let due = entry.requires_update_at(now, self.stale_window);

        debug!(
            provider = provider,
            request_id = %entry.request.request_id,
            existed = entry.existed,
            due = due,
            "Checked provider request"
        );

        Ok(due)
    }

    /// Record a finished run: `results = count`, `updated_at = now`
    pub async fn record_run(
        &self,
        provider: &str,
        options: &RequestOptions,
        results: i64,
    ) -> Result<ProviderRequest> {
        let mut conn = self.pool.acquire().await?;
        Self::record_run_with(&mut conn, provider, &options.request_id(), results, Utc::now()).await
    }

    /// All ledger entries, most recently run first
    pub async fn list(&self) -> Result<Vec<ProviderRequest>> {
        let requests = sqlx::query_as::<_, ProviderRequest>(&format!(
            "{} ORDER BY updated_at IS NULL, updated_at DESC, id",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    pub(crate) async fn find_with(
        conn: &mut SqliteConnection,
        provider: &str,
        request_id: &str,
    ) -> Result<Option<ProviderRequest>> {
        let request = sqlx::query_as::<_, ProviderRequest>(&format!(
            "{} WHERE provider = ? AND request_id = ?",
            SELECT_COLUMNS
        ))
        .bind(provider)
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(request)
    }

    pub(crate) async fn get_or_create_with(
        conn: &mut SqliteConnection,
        provider: &str,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO provider_requests (provider, request_id, results, created_at, updated_at)
            VALUES (?, ?, 0, ?, NULL)
            ON CONFLICT (provider, request_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(request_id)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let request = Self::find_with(conn, provider, request_id)
            .await?
            .ok_or_else(|| {
                crate::error::ProxyDbError::Internal(format!(
                    "provider request {}/{} vanished after upsert",
                    provider, request_id
                ))
            })?;

        Ok(LedgerEntry {
            request,
            existed: inserted == 0,
        })
    }

    pub(crate) async fn record_run_with(
        conn: &mut SqliteConnection,
        provider: &str,
        request_id: &str,
        results: i64,
        now: DateTime<Utc>,
    ) -> Result<ProviderRequest> {
        let request = sqlx::query_as::<_, ProviderRequest>(
            r#"
            INSERT INTO provider_requests (provider, request_id, results, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (provider, request_id) DO UPDATE
                SET results = excluded.results,
                    updated_at = excluded.updated_at
            RETURNING id, provider, request_id, results, created_at, updated_at
            "#,
        )
        .bind(provider)
        .bind(request_id)
        .bind(results)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        info!(
            provider = provider,
            request_id = request_id,
            results = results,
            "Recorded provider run"
        );

        Ok(request)
    }
}
