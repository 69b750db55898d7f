//! Proxy selection sessions
//!
//! A `ProxiesList` hands out proxies matching a filter, best first, never the
//! same one twice. When the store has nothing left it refreshes the first
//! provider that is due and looks once more.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::{ProxyDbError, Result};
use crate::geo::GeoLookup;
use crate::models::{Protocol, Proxy};
use crate::providers::{Provider, ProviderRegistry};
use crate::repository::{ProviderRequestRepository, ProxyQuery, ProxyRepository};
use crate::selection::{create_strategy, SelectionStrategy, StrategyKind};

/// Store lookups per `next_proxy` call; a reload happens only between them
const MAX_LOOKUPS: usize = 2;

/// Filters of a selection session
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub country: Option<String>,
    pub protocol: Option<Protocol>,
    /// Restrict to one provider by name
    pub provider: Option<String>,
    pub strategy: StrategyKind,
    pub min_votes: i64,
}

/// Where the session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    SearchingDb,
    SearchingProvider,
    Found,
    Exhausted,
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lookups: usize,
    pub reloads: usize,
    pub returned: usize,
}

/// Selection session over the proxy store
pub struct ProxiesList {
    proxies: ProxyRepository,
    ledger: ProviderRequestRepository,
    registry: ProviderRegistry,
    geo: Arc<dyn GeoLookup>,
    country: Option<String>,
    protocol: Option<Protocol>,
    provider: Option<Arc<dyn Provider>>,
    strategy: Box<dyn SelectionStrategy>,
    state: SessionState,
    stats: SessionStats,
}

impl ProxiesList {
    /// Create a session
    ///
    /// An unknown provider name is rejected here, before any I/O.
    pub fn new(
        proxies: ProxyRepository,
        ledger: ProviderRequestRepository,
        registry: ProviderRegistry,
        geo: Arc<dyn GeoLookup>,
        filter: SessionFilter,
    ) -> Result<Self> {
        let provider = match filter.provider {
            Some(ref name) => Some(registry.require(name)?),
            None => None,
        };

        Ok(Self {
            proxies,
            ledger,
            registry,
            geo,
            country: filter.country.map(|c| c.trim().to_uppercase()),
            protocol: filter.protocol,
            provider,
            strategy: create_strategy(filter.strategy, filter.min_votes),
            state: SessionState::Idle,
            stats: SessionStats::default(),
        })
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.strategy_name()
    }

    /// The requested provider, or every provider that is available
    pub fn available_providers(&self) -> Vec<Arc<dyn Provider>> {
        match self.provider {
            Some(ref provider) => vec![Arc::clone(provider)],
            None => self.registry.available(),
        }
    }

    fn query(&self) -> ProxyQuery {
        ProxyQuery {
            providers: Some(
                self.available_providers()
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect(),
            ),
            country: self.country.clone(),
            protocol: self.protocol,
            ..ProxyQuery::default()
        }
    }

    /// Next unseen proxy in the store
    pub async fn find_db_proxy(&mut self) -> Result<Option<Proxy>> {
        self.state = SessionState::SearchingDb;
        self.stats.lookups += 1;

        let query = self.query();
        self.strategy.select_next(&self.proxies, &query).await
    }

    /// First provider, in priority order, whose last run is due
    pub async fn find_provider(&self) -> Result<Arc<dyn Provider>> {
        for provider in self.available_providers() {
            let options = provider.request_options(self.country());
            if self.ledger.requires_update(provider.name(), &options).await? {
                return Ok(provider);
            }
        }

        Err(ProxyDbError::NoProvidersAvailable)
    }

    /// Fetch the due provider and store its results
    #[instrument(skip(self), fields(country = ?self.country))]
    pub async fn reload_provider(&mut self) -> Result<usize> {
        self.state = SessionState::SearchingProvider;
        self.stats.reloads += 1;

        let provider = self.find_provider().await?;
        let country = self.country.as_deref();
        let url = provider.request_url(country);
        let options = provider.request_options(country);

        info!(provider = provider.name(), url = %url, "Reloading provider");

        let records = provider.fetch(&url, country).await?;
        let proxies = self
            .proxies
            .ingest(provider.name(), &options, &records, self.geo.as_ref())
            .await?;

        Ok(proxies.len())
    }

    /// Next proxy for this session
    ///
    /// `Ok(None)` once nothing matches, even after refreshing a provider.
    /// Fetch and store errors propagate; having no provider due does not.
    pub async fn next_proxy(&mut self) -> Result<Option<Proxy>> {
        for attempt in 1..=MAX_LOOKUPS {
            if let Some(proxy) = self.find_db_proxy().await? {
                self.state = SessionState::Found;
                self.stats.returned += 1;
                return Ok(Some(proxy));
            }
            if attempt == MAX_LOOKUPS {
                break;
            }

            match self.reload_provider().await {
                Ok(count) => debug!(proxies = count, "Provider reloaded"),
                Err(ProxyDbError::NoProvidersAvailable) => {
                    debug!("No provider due for refresh")
                }
                Err(e) => return Err(e),
            }
        }

        self.state = SessionState::Exhausted;
        Ok(None)
    }

    /// Up to `count` proxies
    pub async fn take(&mut self, count: usize) -> Result<Vec<Proxy>> {
        let mut proxies = Vec::with_capacity(count);
        while proxies.len() < count {
            match self.next_proxy().await? {
                Some(proxy) => proxies.push(proxy),
                None => break,
            }
        }
        Ok(proxies)
    }

    /// Forget returned proxies and start over
    pub fn reset(&mut self) {
        self.strategy.reset();
        self.state = SessionState::Idle;
    }
}
