//! Database access: connection pool, engine detection and schema migrations

pub mod migrations;
pub mod pool;

pub use pool::Database;

use std::fmt;

/// Relational engine behind a connection URL
///
/// Only SQLite is wired to a driver; the other variants exist so query
/// compilation can fail fast instead of emitting SQL the engine rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
    Postgres,
    Mysql,
    Other(String),
}

impl Engine {
    /// Detect the engine from a connection URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "sqlite" => Engine::Sqlite,
            "postgres" | "postgresql" => Engine::Postgres,
            "mysql" | "mariadb" => Engine::Mysql,
            _ => Engine::Other(scheme),
        }
    }

    /// SQL expression producing a per-row random sort key, if the engine has one
    pub fn random_function(&self) -> Option<&'static str> {
        match self {
            Engine::Sqlite | Engine::Postgres => Some("RANDOM()"),
            Engine::Mysql => Some("RAND()"),
            Engine::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
            Engine::Mysql => "mysql",
            Engine::Other(name) => name,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
