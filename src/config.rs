use crate::error::{ProxyDbError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Minutes after which a provider request is due for a refresh
pub const DEFAULT_STALE_MINUTES: i64 = 45;

/// Votes added to a proxy every time a provider observes it
pub const DEFAULT_UPDATE_VOTES: i64 = 3;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT x.y; Win64; x64; rv:10.0) Gecko/20100101 Firefox/10.0";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Provider refresh configuration
    pub providers: ProviderConfig,
    /// Outbound HTTP configuration used by providers
    pub http: HttpConfig,
    /// Geolocation configuration
    pub geo: GeoConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Staleness window for provider requests
    pub stale_minutes: i64,
    /// Vote increment applied on every re-observation
    pub update_votes: i64,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent sent to providers
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GeoConfig {
    /// MaxMind country database; geolocation is disabled when unset
    pub countries_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            stale_minutes: DEFAULT_STALE_MINUTES,
            update_votes: DEFAULT_UPDATE_VOTES,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database: DatabaseConfig {
                url: database_url_from_env(),
                max_connections: get_env_or("PROXYDB_DB_MAX_CONNECTIONS", "5")
                    .parse()
                    .map_err(|_| {
                        ProxyDbError::InvalidConfig(
                            "PROXYDB_DB_MAX_CONNECTIONS must be a valid number".into(),
                        )
                    })?,
            },
            providers: ProviderConfig {
                stale_minutes: parse_positive("PROXYDB_STALE_MINUTES", DEFAULT_STALE_MINUTES)?,
                update_votes: parse_positive("PROXYDB_UPDATE_VOTES", DEFAULT_UPDATE_VOTES)?,
            },
            http: HttpConfig {
                user_agent: get_env_or("PROXYDB_USER_AGENT", DEFAULT_USER_AGENT),
                timeout: get_env_or("PROXYDB_HTTP_TIMEOUT", "30").parse().map_err(|_| {
                    ProxyDbError::InvalidConfig(
                        "PROXYDB_HTTP_TIMEOUT must be a number of seconds".into(),
                    )
                })?,
            },
            geo: GeoConfig {
                countries_file: env::var("COUNTRIES_FILE")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
            },
            log: LogConfig::from_env(),
        })
    }

    /// Staleness window as a chrono duration
    pub fn stale_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.providers.stale_minutes)
    }

    /// Provider HTTP timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout)
    }
}

impl LogConfig {
    /// Logging settings alone, readable before the rest of the configuration
    pub fn from_env() -> Self {
        Self {
            level: get_env_or("LOG_LEVEL", "info"),
            format: get_env_or("LOG_FORMAT", "pretty"),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// `PROXYDB_DATABASE_URL` wins over `PROXY_DB_FILE`; both fall back to the
/// per-user data directory.
fn database_url_from_env() -> String {
    if let Ok(url) = env::var("PROXYDB_DATABASE_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }

    let file = env::var("PROXY_DB_FILE").unwrap_or_else(|_| default_database_file());
    format!("sqlite://{}?mode=rwc", file)
}

fn default_database_file() -> String {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() => format!("{}/.local/var/lib/proxy-db/db.sqlite3", home),
        _ => "proxy-db.sqlite3".to_string(),
    }
}

fn parse_positive(key: &str, default: i64) -> Result<i64> {
    let raw = get_env_or(key, &default.to_string());
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ProxyDbError::InvalidConfig(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "PROXYDB_DATABASE_URL",
        "PROXY_DB_FILE",
        "PROXYDB_DB_MAX_CONNECTIONS",
        "PROXYDB_STALE_MINUTES",
        "PROXYDB_UPDATE_VOTES",
        "PROXYDB_USER_AGENT",
        "PROXYDB_HTTP_TIMEOUT",
        "COUNTRIES_FILE",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    pub(crate) struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        pub(crate) fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert!(config.database.url.starts_with("sqlite://"));
        assert!(config.database.url.ends_with("?mode=rwc"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.providers.stale_minutes, 45);
        assert_eq!(config.providers.update_votes, 3);
        assert_eq!(config.http.timeout, 30);
        assert!(config.geo.countries_file.is_none());
        assert_eq!(config.stale_window(), chrono::Duration::minutes(45));
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXY_DB_FILE", "/tmp/proxies.sqlite3");
        env::set_var("PROXYDB_STALE_MINUTES", "10");
        env::set_var("PROXYDB_UPDATE_VOTES", "5");
        env::set_var("PROXYDB_HTTP_TIMEOUT", "7");
        env::set_var("COUNTRIES_FILE", "/tmp/countries.mmdb");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database.url, "sqlite:///tmp/proxies.sqlite3?mode=rwc");
        assert_eq!(config.providers.stale_minutes, 10);
        assert_eq!(config.providers.update_votes, 5);
        assert_eq!(config.http_timeout(), Duration::from_secs(7));
        assert_eq!(
            config.geo.countries_file,
            Some(PathBuf::from("/tmp/countries.mmdb"))
        );
    }

    #[test]
    fn test_config_database_url_wins_over_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXY_DB_FILE", "/tmp/ignored.sqlite3");
        env::set_var("PROXYDB_DATABASE_URL", "sqlite::memory:");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_config_from_env_invalid_stale_window() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXYDB_STALE_MINUTES", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ProxyDbError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_max_connections() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXYDB_DB_MAX_CONNECTIONS", "many");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ProxyDbError::InvalidConfig(_)));
    }
}
