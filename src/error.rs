use thiserror::Error;

/// Unified error type for proxydb
#[derive(Error, Debug)]
pub enum ProxyDbError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Provider errors
    #[error("Upstream fetch from {provider} failed: {message}")]
    UpstreamFetch { provider: String, message: String },

    #[error("No providers available")]
    NoProvidersAvailable,

    // Query errors
    #[error("Random ordering is not supported by the {engine} engine")]
    UnsupportedOrderingPrimitive { engine: String },

    #[error("Invalid filter argument: {0}")]
    InvalidFilterArgument(String),

    // Proxy errors
    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    // Geolocation errors
    #[error("Geo lookup failed: {0}")]
    GeoLookup(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Output errors
    #[error("Unknown export format: {0}. Use one of: line, json")]
    UnknownExportFormat(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for proxydb operations
pub type Result<T> = std::result::Result<T, ProxyDbError>;

impl ProxyDbError {
    /// Process exit code for this error when it reaches the command line
    pub fn exit_code(&self) -> i32 {
        match self {
            // Usage errors
            ProxyDbError::InvalidFilterArgument(_)
            | ProxyDbError::InvalidProxyAddress(_)
            | ProxyDbError::UnsupportedProtocol(_)
            | ProxyDbError::UnknownExportFormat(_)
            | ProxyDbError::InvalidConfig(_) => 2,

            // Nothing could be refreshed
            ProxyDbError::NoProvidersAvailable => 3,

            // Upstream failures
            ProxyDbError::UpstreamFetch { .. } | ProxyDbError::GeoLookup(_) => 4,

            // Store failures
            ProxyDbError::Database(_)
            | ProxyDbError::DatabaseConnection(_)
            | ProxyDbError::UnsupportedOrderingPrimitive { .. } => 5,

            ProxyDbError::Io(_) | ProxyDbError::Internal(_) => 1,
        }
    }

    /// Check if this error was caused by caller input
    pub fn is_usage_error(&self) -> bool {
        self.exit_code() == 2
    }

    pub(crate) fn upstream(provider: &str, err: impl std::fmt::Display) -> Self {
        ProxyDbError::UpstreamFetch {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for ProxyDbError {
    fn from(err: url::ParseError) -> Self {
        ProxyDbError::InvalidProxyAddress(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_code_mapping() {
        assert_eq!(
            ProxyDbError::InvalidFilterArgument("foo".to_string()).exit_code(),
            2
        );
        assert_eq!(ProxyDbError::NoProvidersAvailable.exit_code(), 3);
        assert_eq!(
            ProxyDbError::upstream("Proxy Nova", "connection reset").exit_code(),
            4
        );
        assert_eq!(
            ProxyDbError::UnsupportedOrderingPrimitive {
                engine: "mssql".to_string()
            }
            .exit_code(),
            5
        );
    }

    #[test]
    fn test_error_usage_helper() {
        assert!(ProxyDbError::UnknownExportFormat("xml".to_string()).is_usage_error());
        assert!(!ProxyDbError::NoProvidersAvailable.is_usage_error());
    }

    #[test]
    fn test_upstream_error_message() {
        let err = ProxyDbError::upstream("Nord VPN", "timed out");
        assert_eq!(
            err.to_string(),
            "Upstream fetch from Nord VPN failed: timed out"
        );
    }
}
