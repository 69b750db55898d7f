//! Proxy providers
//!
//! A provider polls one upstream source and returns raw candidate entries.
//! Persistence, country resolution and the request ledger are handled by the
//! repositories; providers only fetch and parse.

mod http;
mod manual;
mod nord_vpn;
mod proxy_nova;

pub use http::HttpClient;
pub use manual::ManualProvider;
pub use nord_vpn::NordVpnProvider;
pub use proxy_nova::{PageParse, ProxyNovaProvider, RowIssue};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ProxyDbError, Result};
use crate::models::{Credentials, RawProxy, RequestOptions};

/// Upstream source of candidate proxies
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable display name, also the ledger key
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    /// False when the provider needs credentials that are not configured
    fn is_available(&self) -> bool {
        true
    }

    fn credentials(&self) -> Option<Credentials> {
        None
    }

    /// URL to poll for a country filter
    fn request_url(&self, _country: Option<&str>) -> String {
        self.base_url().to_string()
    }

    /// Options identifying the poll in the ledger
    fn request_options(&self, country: Option<&str>) -> RequestOptions {
        RequestOptions::for_country(country)
    }

    /// Fetch and parse one page of candidates
    ///
    /// Malformed rows are logged and skipped; transport and payload errors
    /// propagate as `UpstreamFetch`.
    async fn fetch(&self, url: &str, country: Option<&str>) -> Result<Vec<RawProxy>>;
}

/// Providers in refresh priority order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Built-in providers: Nord VPN, Proxy Nova, then manual input
    pub fn builtin(http: HttpClient) -> Self {
        Self::new(vec![
            Arc::new(NordVpnProvider::from_env(http.clone())),
            Arc::new(ProxyNovaProvider::new(http)),
            Arc::new(ManualProvider::new()),
        ])
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Like `get`, but an unknown name is an invalid filter
    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.get(name).ok_or_else(|| {
            ProxyDbError::InvalidFilterArgument(format!(
                "unknown provider {:?}, expected one of: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    /// Providers whose credentials, if any, are configured
    pub fn available(&self) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
