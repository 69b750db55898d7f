use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar value of a provider request option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Null => Ok(()),
            OptionValue::Bool(value) => write!(f, "{}", value),
            OptionValue::Int(value) => write!(f, "{}", value),
            OptionValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value.into())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(OptionValue::Null)
    }
}

/// Options a provider was polled with
///
/// Keys are kept sorted so the derived request id does not depend on
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions(BTreeMap<String, OptionValue>);

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The options every provider is polled with: the requested country
    pub fn for_country(country: Option<&str>) -> Self {
        Self::new().with("country", country)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Values ordered by key, joined with `-`
    pub fn request_id(&self) -> String {
        self.0
            .values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Ledger entry: the last run of one provider with one option set
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderRequest {
    pub id: i64,
    pub provider: String,
    pub request_id: String,
    /// Proxies yielded by the most recent run
    pub results: i64,
    pub created_at: DateTime<Utc>,
    /// Last run; `None` until the request has run once
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProviderRequest {
    /// Whether the last run is older than `window` at `now`
    ///
    /// The boundary is exclusive: an entry exactly `window` old is still fresh.
    pub fn is_stale_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.updated_at {
            Some(updated_at) => now - updated_at > window,
            None => true,
        }
    }
}

/// Result of a ledger lookup
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub request: ProviderRequest,
    /// Whether the row existed before the lookup
    pub existed: bool,
}

impl LedgerEntry {
    /// True when the entry was just created or its last run is stale
    pub fn requires_update_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.existed || self.request.is_stale_at(now, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_request(updated_at: Option<DateTime<Utc>>) -> ProviderRequest {
        ProviderRequest {
            id: 1,
            provider: "Proxy Nova".to_string(),
            request_id: "ES".to_string(),
            results: 0,
            created_at: Utc::now(),
            updated_at,
        }
    }

    #[test]
    fn test_request_id() {
        let options = RequestOptions::new().with("country", "es").with("spam", 1);
        assert_eq!(options.request_id(), "es-1");
    }

    #[test]
    fn test_request_id_is_order_independent() {
        let options = RequestOptions::new().with("spam", 1).with("country", "es");
        assert_eq!(options.request_id(), "es-1");
    }

    #[test]
    fn test_request_id_null_and_bool() {
        assert_eq!(RequestOptions::for_country(None).request_id(), "");
        let options = RequestOptions::for_country(Some("ES")).with("ssl", true);
        assert_eq!(options.request_id(), "ES-true");
    }

    #[test]
    fn test_staleness_boundary_is_exclusive() {
        let now = Utc::now();
        let window = Duration::minutes(45);

        let exact = create_test_request(Some(now - window));
        assert!(!exact.is_stale_at(now, window));

        let past = create_test_request(Some(now - window - Duration::seconds(1)));
        assert!(past.is_stale_at(now, window));

        let fresh = create_test_request(Some(now));
        assert!(!fresh.is_stale_at(now, window));
    }

    #[test]
    fn test_never_run_is_stale() {
        let request = create_test_request(None);
        assert!(request.is_stale_at(Utc::now(), Duration::minutes(45)));
    }

    #[test]
    fn test_new_entry_requires_update() {
        let now = Utc::now();
        let entry = LedgerEntry {
            request: create_test_request(Some(now)),
            existed: false,
        };
        assert!(entry.requires_update_at(now, Duration::minutes(45)));

        let entry = LedgerEntry {
            existed: true,
            ..entry
        };
        assert!(!entry.requires_update_at(now, Duration::minutes(45)));
    }
}
