use crate::config::DEFAULT_UPDATE_VOTES;
use crate::database::Engine;
use crate::error::{ProxyDbError, Result};
use crate::geo::GeoLookup;
use crate::models::{
    normalize_country, Protocol, Proxy, ProxyListParams, RawProxy, RequestOptions,
};
use crate::repository::ProviderRequestRepository;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Votes granted to proxies added by hand
pub const MANUAL_VOTES: i64 = 10;

/// Provider name used for hand-added proxies
pub const MANUAL_PROVIDER: &str = "manual";

const PROXY_COLUMNS: &str = "p.id, p.votes, p.country, p.protocol, p.created_at, p.updated_at";

/// Ordering applied to a proxy query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyOrder {
    /// Store-native order
    #[default]
    Unordered,
    VotesDesc,
    Random,
}

impl ProxyOrder {
    /// ORDER BY expression for `engine`, `None` when no ordering is requested
    pub fn sql(&self, engine: &Engine) -> Result<Option<String>> {
        match self {
            ProxyOrder::Unordered => Ok(None),
            ProxyOrder::VotesDesc => Ok(Some("p.votes DESC".to_string())),
            ProxyOrder::Random => engine
                .random_function()
                .map(|f| Some(f.to_string()))
                .ok_or_else(|| ProxyDbError::UnsupportedOrderingPrimitive {
                    engine: engine.to_string(),
                }),
        }
    }
}

/// Filter and order over the proxy table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyQuery {
    /// Only proxies observed by one of these providers; `None` disables the filter
    pub providers: Option<Vec<String>>,
    pub country: Option<String>,
    pub protocol: Option<Protocol>,
    pub min_votes: Option<i64>,
    /// Proxy ids to leave out
    pub exclude: Vec<String>,
    pub order: ProxyOrder,
    pub limit: Option<i64>,
}

impl ProxyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile into a SELECT over `proxies p`
    pub fn build(&self, engine: &Engine) -> Result<QueryBuilder<'static, Sqlite>> {
        let order = self.order.sql(engine)?;

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM proxies p WHERE 1=1",
            PROXY_COLUMNS
        ));

        if let Some(min_votes) = self.min_votes {
            query.push(" AND p.votes >= ").push_bind(min_votes);
        }
        if let Some(ref country) = self.country {
            query.push(" AND p.country = ").push_bind(country.clone());
        }
        if let Some(protocol) = self.protocol {
            query.push(" AND p.protocol = ").push_bind(protocol.as_str());
        }
        if !self.exclude.is_empty() {
            query.push(" AND p.id NOT IN (");
            let mut ids = query.separated(", ");
            for id in &self.exclude {
                ids.push_bind(id.clone());
            }
            query.push(")");
        }
        match self.providers {
            Some(ref providers) if providers.is_empty() => {
                query.push(" AND 0");
            }
            Some(ref providers) => {
                query.push(
                    " AND EXISTS (SELECT 1 FROM proxy_provider_requests ppr \
                     JOIN provider_requests pr ON pr.id = ppr.provider_request_id \
                     WHERE ppr.proxy_id = p.id AND pr.provider IN (",
                );
                let mut names = query.separated(", ");
                for name in providers {
                    names.push_bind(name.clone());
                }
                query.push("))");
            }
            None => {}
        }

        if let Some(order) = order {
            query.push(" ORDER BY ").push(order);
        }
        if let Some(limit) = self.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        Ok(query)
    }
}

/// Repository for proxy database operations
#[derive(Clone)]
pub struct ProxyRepository {
    pool: SqlitePool,
    engine: Engine,
    update_votes: i64,
}

impl ProxyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            engine: Engine::Sqlite,
            update_votes: DEFAULT_UPDATE_VOTES,
        }
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Votes added per re-observation
    pub fn with_update_votes(mut self, votes: i64) -> Self {
        self.update_votes = votes;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a proxy by its canonical address
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Proxy>> {
        let proxy = sqlx::query_as::<_, Proxy>(&format!(
            "SELECT {} FROM proxies p WHERE p.id = ?",
            PROXY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match proxy {
            Some(mut proxy) => {
                proxy.providers = self.providers_for(&proxy.id).await?;
                Ok(Some(proxy))
            }
            None => Ok(None),
        }
    }

    /// Names of the providers that observed a proxy
    pub async fn providers_for(&self, id: &str) -> Result<Vec<String>> {
        let providers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT pr.provider
            FROM proxy_provider_requests ppr
            JOIN provider_requests pr ON pr.id = ppr.provider_request_id
            WHERE ppr.proxy_id = ?
            ORDER BY pr.provider
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(providers)
    }

    /// First proxy matching `query`
    pub async fn find_first(&self, query: &ProxyQuery) -> Result<Option<Proxy>> {
        let query = ProxyQuery {
            limit: Some(1),
            ..query.clone()
        };
        let mut builder = query.build(&self.engine)?;
        let mut proxy: Option<Proxy> =
            builder.build_query_as().fetch_optional(&self.pool).await?;

        debug!(
            found = proxy.as_ref().map(|p| p.id.as_str()),
            excluded = query.exclude.len(),
            "Proxy lookup"
        );

        if let Some(ref mut proxy) = proxy {
            proxy.providers = self.providers_for(&proxy.id).await?;
        }

        Ok(proxy)
    }

    /// All proxies matching `query`
    pub async fn find_all(&self, query: &ProxyQuery) -> Result<Vec<Proxy>> {
        let mut builder = query.build(&self.engine)?;
        let mut proxies: Vec<Proxy> = builder.build_query_as().fetch_all(&self.pool).await?;

        for proxy in proxies.iter_mut() {
            proxy.providers = self.providers_for(&proxy.id).await?;
        }

        Ok(proxies)
    }

    /// List proxies by votes with optional filters
    pub async fn list(&self, params: &ProxyListParams) -> Result<Vec<Proxy>> {
        let query = ProxyQuery {
            providers: params.provider.clone().map(|p| vec![p]),
            country: params.country.as_deref().map(str::to_uppercase),
            protocol: params.protocol,
            min_votes: params.min_votes,
            exclude: Vec::new(),
            order: ProxyOrder::VotesDesc,
            limit: params.limit.map(|l| l.max(1)),
        };

        self.find_all(&query).await
    }

    /// Get total proxy count
    pub async fn count_total(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM proxies")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Add one vote
    pub async fn positive(&self, id: &str) -> Result<Option<Proxy>> {
        self.vote(id, 1).await
    }

    /// Remove one vote
    pub async fn negative(&self, id: &str) -> Result<Option<Proxy>> {
        self.vote(id, -1).await
    }

    /// Single-statement vote adjustment; `None` when the proxy does not exist
    pub async fn vote(&self, id: &str, delta: i64) -> Result<Option<Proxy>> {
        let proxy = sqlx::query_as::<_, Proxy>(
            r#"
            UPDATE proxies
            SET votes = votes + ?, updated_at = ?
            WHERE id = ?
            RETURNING id, votes, country, protocol, created_at, updated_at
            "#,
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref p) = proxy {
            debug!(id = %p.id, votes = p.votes, delta = delta, "Voted proxy");
        }

        Ok(proxy)
    }

    /// Persist one provider run
    ///
    /// Every record is normalized, found-or-created, given a country when it
    /// has none and bumped by the update votes. The ledger entry for
    /// (provider, options) is upserted with the number of proxies and linked
    /// to each of them. Everything commits in one transaction.
    pub async fn ingest(
        &self,
        provider: &str,
        options: &RequestOptions,
        records: &[RawProxy],
        geo: &dyn GeoLookup,
    ) -> Result<Vec<Proxy>> {
        self.ingest_with_votes(provider, options, records, self.update_votes, geo)
            .await
    }

    /// Add proxies supplied by the user under the `manual` provider
    pub async fn add_manual(
        &self,
        records: &[RawProxy],
        votes: i64,
        geo: &dyn GeoLookup,
    ) -> Result<Vec<Proxy>> {
        self.ingest_with_votes(MANUAL_PROVIDER, &RequestOptions::new(), records, votes, geo)
            .await
    }

    pub async fn ingest_with_votes(
        &self,
        provider: &str,
        options: &RequestOptions,
        records: &[RawProxy],
        votes: i64,
        geo: &dyn GeoLookup,
    ) -> Result<Vec<Proxy>> {
        let now = Utc::now();
        let request_id = options.request_id();
        let mut tx = self.pool.begin().await?;

        // Write first: a deferred transaction that reads before its first
        // write cannot wait for a concurrent writer and fails with SQLITE_BUSY.
        ProviderRequestRepository::get_or_create_with(&mut tx, provider, &request_id, now).await?;

        let mut seen = HashSet::new();
        let mut proxies = Vec::with_capacity(records.len());
        for record in records {
            let address = match record.address() {
                Ok(address) => address,
                Err(e) => {
                    warn!(provider = provider, proxy = %record.proxy, error = %e, "Skipping invalid proxy record");
                    continue;
                }
            };
            let id = address.canonical();
            if !seen.insert(id.clone()) {
                continue;
            }

            let current_country =
                sqlx::query_scalar::<_, Option<String>>("SELECT country FROM proxies WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let has_country = current_country.flatten().is_some_and(|c| !c.is_empty());
            let country = if has_country {
                None
            } else {
                resolve_country(record, address.domain(), geo)?
            };

            let proxy = upsert_proxy(
                &mut tx,
                &id,
                address.protocol,
                country.as_deref(),
                votes,
                now,
            )
            .await?;
            proxies.push(proxy);
        }

        let request = ProviderRequestRepository::record_run_with(
            &mut tx,
            provider,
            &request_id,
            proxies.len() as i64,
            now,
        )
        .await?;

        for proxy in &proxies {
            sqlx::query(
                "INSERT OR IGNORE INTO proxy_provider_requests (proxy_id, provider_request_id) VALUES (?, ?)",
            )
            .bind(&proxy.id)
            .bind(request.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            provider = provider,
            request_id = %request.request_id,
            records = records.len(),
            proxies = proxies.len(),
            "Ingested provider results"
        );

        for proxy in proxies.iter_mut() {
            proxy.providers = self.providers_for(&proxy.id).await?;
        }

        Ok(proxies)
    }
}

/// Country for a proxy without one: the record hint, then geolocation
fn resolve_country(record: &RawProxy, host: &str, geo: &dyn GeoLookup) -> Result<Option<String>> {
    if let Some(country) = record.country.as_deref().and_then(normalize_country) {
        return Ok(Some(country));
    }
    Ok(geo.lookup(host)?.as_deref().and_then(normalize_country))
}

async fn upsert_proxy(
    conn: &mut SqliteConnection,
    id: &str,
    protocol: Protocol,
    country: Option<&str>,
    votes: i64,
    now: DateTime<Utc>,
) -> Result<Proxy> {
    let proxy = sqlx::query_as::<_, Proxy>(
        r#"
        INSERT INTO proxies (id, votes, country, protocol, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE
            SET votes = proxies.votes + excluded.votes,
                country = COALESCE(NULLIF(proxies.country, ''), excluded.country),
                updated_at = excluded.updated_at
        RETURNING id, votes, country, protocol, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(votes)
    .bind(country)
    .bind(protocol.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(proxy)
}
