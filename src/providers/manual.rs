use async_trait::async_trait;
use parking_lot::Mutex;

use super::Provider;
use crate::error::Result;
use crate::models::RawProxy;
use crate::repository::MANUAL_PROVIDER;

/// Proxies supplied by the user
///
/// Entries pushed here are handed out by the next `fetch`, so a session can
/// refresh from user input like from any other source.
#[derive(Default)]
pub struct ManualProvider {
    queue: Mutex<Vec<RawProxy>>,
}

impl ManualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<I: IntoIterator<Item = RawProxy>>(&self, proxies: I) {
        self.queue.lock().extend(proxies);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl Provider for ManualProvider {
    fn name(&self) -> &str {
        MANUAL_PROVIDER
    }

    fn base_url(&self) -> &str {
        ""
    }

    async fn fetch(&self, _url: &str, _country: Option<&str>) -> Result<Vec<RawProxy>> {
        Ok(std::mem::take(&mut *self.queue.lock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_drains_queue() {
        let provider = ManualProvider::new();
        provider.push(vec![
            RawProxy::new("1.2.3.4:8080"),
            RawProxy::new("socks5://5.6.7.8:1080"),
        ]);
        assert_eq!(provider.pending(), 2);

        let proxies = provider.fetch("", None).await.unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(provider.pending(), 0);
        assert!(provider.fetch("", None).await.unwrap().is_empty());
    }
}
