//! Country lookup for proxy hosts
//!
//! Lookups are injected into ingestion as a `&dyn GeoLookup`; the MaxMind
//! reader is opened once at startup and shared by reference.

use crate::error::{ProxyDbError, Result};
use crate::models::normalize_country;
use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Maps a host to an ISO country code
pub trait GeoLookup: Send + Sync {
    /// `Ok(None)` when the host has no known country; errors are reserved for
    /// reader failures.
    fn lookup(&self, host: &str) -> Result<Option<String>>;
}

/// Lookup used when no country database is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoLookup;

impl GeoLookup for NoGeoLookup {
    fn lookup(&self, _host: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Lookup backed by a MaxMind country (or city) database
pub struct MaxMindGeoLookup {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindGeoLookup {
    /// Open an MMDB file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|e| {
            ProxyDbError::GeoLookup(format!("cannot open {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Opened country database");

        Ok(Self {
            reader: Arc::new(reader),
        })
    }
}

impl Clone for MaxMindGeoLookup {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn lookup(&self, host: &str) -> Result<Option<String>> {
        // Domains are not resolved
        let Ok(ip) = host.parse::<IpAddr>() else {
            return Ok(None);
        };

        let result = self
            .reader
            .lookup(ip)
            .map_err(|e| ProxyDbError::GeoLookup(e.to_string()))?;
        let country: Option<geoip2::Country> = result
            .decode()
            .map_err(|e| ProxyDbError::GeoLookup(e.to_string()))?;

        Ok(country
            .and_then(|c| c.country.iso_code)
            .and_then(normalize_country))
    }
}

/// Fixed host → country table
///
/// Counts lookups, which makes it the usual stand-in for the MaxMind reader.
#[derive(Debug, Default)]
pub struct StaticGeoLookup {
    countries: HashMap<String, String>,
    calls: AtomicUsize,
    fail: bool,
}

impl StaticGeoLookup {
    pub fn new<I, H, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (H, C)>,
        H: Into<String>,
        C: Into<String>,
    {
        Self {
            countries: entries
                .into_iter()
                .map(|(h, c)| (h.into(), c.into()))
                .collect(),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Lookup whose every call fails like an unreadable database
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Number of lookups performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, host: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(ProxyDbError::GeoLookup(format!(
                "lookup of {} failed",
                host
            )));
        }
        Ok(self.countries.get(host).cloned())
    }
}
