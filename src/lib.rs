//! proxydb - Proxy pool with provider refresh
//!
//! Keeps a local store of proxies gathered from public and authenticated
//! providers, and hands them out best voted first.
//!
//! ## Features
//!
//! - Provider request ledger that refreshes a provider only once its last run is stale
//! - Scraping, JSON API and manual providers
//! - Votes and random selection strategies with no-repeat sessions
//! - Country resolution from provider hints or a MaxMind database
//! - SQLite storage with explicit migrations

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod geo;
pub mod models;
pub mod providers;
pub mod repository;
pub mod selection;
pub mod services;

pub use config::Config;
pub use database::Database;
pub use error::{ProxyDbError, Result};
pub use services::{ProxiesList, SessionFilter};
