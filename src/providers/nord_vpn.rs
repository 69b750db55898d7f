use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{HttpClient, Provider};
use crate::error::Result;
use crate::models::{normalize_country, Credentials, Protocol, RawProxy};

const NAME: &str = "Nord VPN";
const BASE_URL: &str = "https://api.nordvpn.com/server";
pub const USERNAME_ENV: &str = "PROXYDB_NORDVPN_USERNAME";
pub const PASSWORD_ENV: &str = "PROXYDB_NORDVPN_PASSWORD";

/// Server feature exposed as a proxy endpoint
struct ProtocolFeature {
    feature: &'static str,
    protocol: Protocol,
    port: u16,
    use_domain: bool,
}

const FEATURES: [ProtocolFeature; 3] = [
    ProtocolFeature {
        feature: "socks",
        protocol: Protocol::Socks5,
        port: 1080,
        use_domain: false,
    },
    ProtocolFeature {
        feature: "proxy",
        protocol: Protocol::Http,
        port: 80,
        use_domain: false,
    },
    ProtocolFeature {
        feature: "proxy_ssl",
        protocol: Protocol::Https,
        port: 89,
        use_domain: true,
    },
];

/// Server entry of the Nord VPN API
#[derive(Debug, Deserialize)]
pub struct NordVpnServer {
    pub ip_address: String,
    pub domain: String,
    pub flag: String,
    #[serde(default)]
    pub features: HashMap<String, serde_json::Value>,
}

impl NordVpnServer {
    fn has_feature(&self, feature: &str) -> bool {
        self.features
            .get(feature)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Nord VPN server list; proxies require account credentials
pub struct NordVpnProvider {
    http: HttpClient,
    base_url: String,
    credentials: Option<Credentials>,
}

impl NordVpnProvider {
    pub fn new(http: HttpClient, credentials: Option<Credentials>) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
            credentials,
        }
    }

    /// Provider with credentials from `PROXYDB_NORDVPN_USERNAME` and
    /// `PROXYDB_NORDVPN_PASSWORD`
    pub fn from_env(http: HttpClient) -> Self {
        Self::new(http, Credentials::from_env(USERNAME_ENV, PASSWORD_ENV))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One entry per enabled proxy feature of every server
    pub fn parse_servers(servers: &[NordVpnServer]) -> Vec<RawProxy> {
        let mut proxies = Vec::new();

        for server in servers {
            let country = normalize_country(&server.flag);
            if country.is_none() {
                warn!(
                    provider = NAME,
                    ip = %server.ip_address,
                    country = %server.flag,
                    "Invalid country in server"
                );
            }

            for feature in FEATURES.iter().filter(|f| server.has_feature(f.feature)) {
                let host = if feature.use_domain {
                    &server.domain
                } else {
                    &server.ip_address
                };
                proxies.push(
                    RawProxy::new(format!("{}:{}", host, feature.port))
                        .with_protocol(feature.protocol)
                        .with_country(country.clone()),
                );
            }
        }

        proxies
    }
}

#[async_trait]
impl Provider for NordVpnProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    fn credentials(&self) -> Option<Credentials> {
        self.credentials.clone()
    }

    async fn fetch(&self, url: &str, _country: Option<&str>) -> Result<Vec<RawProxy>> {
        let servers: Vec<NordVpnServer> = self.http.get_json(NAME, url).await?;
        let proxies = Self::parse_servers(&servers);

        debug!(
            provider = NAME,
            servers = servers.len(),
            proxies = proxies.len(),
            "Parsed server list"
        );

        Ok(proxies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{EnvGuard, ENV_LOCK};
    use crate::config::HttpConfig;

    const SERVERS: &str = r#"[
        {
            "id": 0, "ip_address": "123.123.123.123", "search_keywords": [], "load": 55,
            "categories": [{"name": "Standard VPN servers"}, {"name": "P2P"}],
            "name": "United States #0", "domain": "us0.nordvpn.com", "price": 0,
            "flag": "US", "country": "United States", "location": {"lat": 0, "long": 0},
            "features": {
                "ikev2": true, "openvpn_udp": true, "openvpn_tcp": true, "socks": true,
                "proxy": true, "pptp": false, "l2tp": false, "proxy_cybersec": false,
                "proxy_ssl": true, "proxy_ssl_cybersec": true, "wireguard_udp": false
            }
        }
    ]"#;

    fn http() -> HttpClient {
        HttpClient::new(&HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_servers() {
        let servers: Vec<NordVpnServer> = serde_json::from_str(SERVERS).unwrap();
        let proxies = NordVpnProvider::parse_servers(&servers);
        let us = Some("US".to_string());

        assert_eq!(
            proxies,
            vec![
                RawProxy::new("123.123.123.123:1080")
                    .with_protocol(Protocol::Socks5)
                    .with_country(us.clone()),
                RawProxy::new("123.123.123.123:80")
                    .with_protocol(Protocol::Http)
                    .with_country(us.clone()),
                RawProxy::new("us0.nordvpn.com:89")
                    .with_protocol(Protocol::Https)
                    .with_country(us),
            ]
        );
    }

    #[test]
    fn test_parse_servers_invalid_country() {
        let servers = vec![NordVpnServer {
            ip_address: "123.123.123.123".to_string(),
            domain: "us0.nordvpn.com".to_string(),
            flag: "FOO".to_string(),
            features: HashMap::from([("socks".to_string(), serde_json::Value::Bool(true))]),
        }];

        assert_eq!(
            NordVpnProvider::parse_servers(&servers),
            vec![RawProxy::new("123.123.123.123:1080").with_protocol(Protocol::Socks5)]
        );
    }

    #[test]
    fn test_availability_follows_credentials() {
        let provider = NordVpnProvider::new(http(), None);
        assert!(!provider.is_available());
        assert!(provider.credentials().is_none());

        let provider = NordVpnProvider::new(http(), Some(Credentials::new("user", "pass")));
        assert!(provider.is_available());
        assert_eq!(provider.credentials().unwrap().username, "user");
        assert_eq!(provider.request_url(Some("ES")), BASE_URL);
    }

    #[test]
    fn test_credentials_from_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(&[USERNAME_ENV, PASSWORD_ENV]);

        std::env::set_var(USERNAME_ENV, "user");
        assert!(!NordVpnProvider::from_env(http()).is_available());

        std::env::set_var(PASSWORD_ENV, "pass");
        let provider = NordVpnProvider::from_env(http());
        assert!(provider.is_available());
        assert_eq!(
            provider.credentials(),
            Some(Credentials::new("user", "pass"))
        );
    }
}
