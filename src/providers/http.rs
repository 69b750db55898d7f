use crate::config::HttpConfig;
use crate::error::{ProxyDbError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client shared by all network providers
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| ProxyDbError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// GET `url` and return the body; non-2xx statuses are errors
    pub async fn get_text(&self, provider: &str, url: &str) -> Result<String> {
        debug!(provider = provider, url = url, "Fetching provider page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProxyDbError::upstream(provider, e))?;

        response
            .text()
            .await
            .map_err(|e| ProxyDbError::upstream(provider, e))
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, provider: &str, url: &str) -> Result<T> {
        let body = self.get_text(provider, url).await?;
        serde_json::from_str(&body).map_err(|e| ProxyDbError::upstream(provider, e))
    }
}
