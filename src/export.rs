//! Output formats for proxy listings

use std::fmt;

use crate::error::{ProxyDbError, Result};
use crate::models::Proxy;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// One proxy address per line
    #[default]
    Line,
    /// Pretty-printed JSON array with every field
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Line, ExportFormat::Json];

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| ProxyDbError::UnknownExportFormat(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Line => "line",
            ExportFormat::Json => "json",
        }
    }

    pub fn render(&self, proxies: &[Proxy]) -> Result<String> {
        match self {
            ExportFormat::Line => Ok(proxies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")),
            ExportFormat::Json => serde_json::to_string_pretty(proxies)
                .map_err(|e| ProxyDbError::Internal(format!("cannot serialize proxies: {}", e))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render `proxies` in the format called `name`
pub fn render(name: &str, proxies: &[Proxy]) -> Result<String> {
    ExportFormat::parse(name)?.render(proxies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_proxy(id: &str, votes: i64) -> Proxy {
        Proxy {
            id: id.to_string(),
            votes,
            country: Some("ES".to_string()),
            protocol: "http".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            providers: vec!["Proxy Nova".to_string()],
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(ExportFormat::parse("line").unwrap(), ExportFormat::Line);
        assert_eq!(ExportFormat::parse("json").unwrap(), ExportFormat::Json);

        let err = ExportFormat::parse("xml").unwrap_err();
        assert!(matches!(err, ProxyDbError::UnknownExportFormat(ref name) if name == "xml"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_render_line() {
        let proxies = vec![
            create_test_proxy("http://1.2.3.4:8080", 3),
            create_test_proxy("socks5://5.6.7.8:1080", 6),
        ];

        let output = render("line", &proxies).unwrap();
        assert_eq!(output, "http://1.2.3.4:8080\nsocks5://5.6.7.8:1080");
        assert_eq!(render("line", &[]).unwrap(), "");
    }

    #[test]
    fn test_render_json() {
        let proxies = vec![create_test_proxy("http://1.2.3.4:8080", 3)];

        let output = ExportFormat::Json.render(&proxies).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value[0]["id"], "http://1.2.3.4:8080");
        assert_eq!(value[0]["votes"], 3);
        assert_eq!(value[0]["country"], "ES");
        assert_eq!(value[0]["providers"][0], "Proxy Nova");
    }
}
