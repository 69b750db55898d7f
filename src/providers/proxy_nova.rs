use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

use super::{HttpClient, Provider};
use crate::error::Result;
use crate::models::{normalize_country, RawProxy};

const NAME: &str = "Proxy Nova";
const BASE_URL: &str = "https://www.proxynova.com/proxy-server-list/";

static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*\bdata-proxy-id\b[^>]*>(.*?)</tr>").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").unwrap());
static CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap());
static FLAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*\bclass\s*=\s*"[^"]*\bflag\b[^"]*"[^>]*>"#).unwrap()
});
static ALT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\balt\s*=\s*"([^"]*)""#).unwrap());

/// Malformed table row found while scraping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIssue {
    /// No `<script>` holding the address; row skipped
    MissingScript,
    /// Fewer than two cells, so no port; row skipped
    MissingPortCell,
    /// Script does not contain an IPv4 address; row skipped
    InvalidScript,
    /// No flag image or no `alt`; row kept without country
    MissingCountry,
    /// Flag `alt` is not a known country code; row kept without country
    UnknownCountry(String),
}

impl RowIssue {
    pub fn skips_row(&self) -> bool {
        matches!(
            self,
            RowIssue::MissingScript | RowIssue::MissingPortCell | RowIssue::InvalidScript
        )
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::MissingScript => write!(f, "script tag is not available"),
            RowIssue::MissingPortCell => write!(f, "td tag including port is not available"),
            RowIssue::InvalidScript => write!(f, "invalid script value"),
            RowIssue::MissingCountry => write!(f, "image with country is not available"),
            RowIssue::UnknownCountry(code) => write!(f, "invalid country code {:?}", code),
        }
    }
}

/// Entries and issues found on one page
#[derive(Debug, Default)]
pub struct PageParse {
    pub proxies: Vec<RawProxy>,
    pub issues: Vec<RowIssue>,
}

/// Scrapes the public Proxy Nova server list
pub struct ProxyNovaProvider {
    http: HttpClient,
    base_url: String,
}

impl ProxyNovaProvider {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse every `tr[data-proxy-id]` row of a list page
    pub fn parse_page(html: &str) -> PageParse {
        let mut page = PageParse::default();

        for row in ROW_RE.captures_iter(html) {
            let row = row.get(1).map(|m| m.as_str()).unwrap_or_default();
            match parse_row(row, &mut page.issues) {
                Some(proxy) => page.proxies.push(proxy),
                None => continue,
            }
        }

        page
    }
}

fn report(issues: &mut Vec<RowIssue>, issue: RowIssue, row: &str) {
    warn!(provider = NAME, issue = %issue, row = row.trim(), "Skipping malformed row data");
    issues.push(issue);
}

fn parse_row(row: &str, issues: &mut Vec<RowIssue>) -> Option<RawProxy> {
    let Some(script) = SCRIPT_RE.captures(row).and_then(|c| c.get(1)) else {
        report(issues, RowIssue::MissingScript, row);
        return None;
    };

    let cells: Vec<&str> = CELL_RE
        .captures_iter(row)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if cells.len() < 2 {
        report(issues, RowIssue::MissingPortCell, row);
        return None;
    }
    let port: String = TAG_RE
        .replace_all(cells[1], " ")
        .split_whitespace()
        .collect();

    let Some(ip) = IP_RE.captures(script.as_str()).and_then(|c| c.get(1)) else {
        report(issues, RowIssue::InvalidScript, row);
        return None;
    };

    let alt = FLAG_RE
        .find(row)
        .and_then(|img| ALT_RE.captures(img.as_str()))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase());

    let country = match alt {
        None => {
            report(issues, RowIssue::MissingCountry, row);
            None
        }
        Some(code) => match normalize_country(&code) {
            Some(country) => Some(country),
            None => {
                report(issues, RowIssue::UnknownCountry(code), row);
                None
            }
        },
    };

    Some(RawProxy::new(format!("{}:{}", ip.as_str(), port)).with_country(country))
}

#[async_trait]
impl Provider for ProxyNovaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_url(&self, country: Option<&str>) -> String {
        match country {
            Some(country) => format!("{}country-{}/", self.base_url, country.to_lowercase()),
            None => self.base_url.clone(),
        }
    }

    async fn fetch(&self, url: &str, _country: Option<&str>) -> Result<Vec<RawProxy>> {
        let html = self.http.get_text(NAME, url).await?;
        let page = Self::parse_page(&html);

        debug!(
            provider = NAME,
            proxies = page.proxies.len(),
            issues = page.issues.len(),
            "Parsed provider page"
        );

        Ok(page.proxies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    const PAGE: &str = r#"
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('91.217.28.125');</script>
        </abbr>
    </td>
    <td align="left">
        3128
    </td>
    <td align="left">
        <img src="/assets/images/blank.gif" class="flag flag-ua inline-block align-middle" alt="ua" />
        <a href="/proxy-server-list/country-ua/"
           title="Proxies from Ukraine">Ukraine
            <span class="proxy-city"> - Kyiv </span>
        </a>
    </td>
</tr>
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('89.145.199.64');</script>
        </abbr>
    </td>
    <td align="left">
        8080
    </td>
    <td align="left">
        <img src="/assets/images/blank.gif" class="flag flag-hu inline-block align-middle" alt="hu">
        <a href="/proxy-server-list/country-hu/" title="Proxies from Hungary">Hungary
            <span class="proxy-city"> - Debrecen </span>
        </a>
    </td>
</tr>
"#;

    const INVALID_ROWS: &str = r#"
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('91.217.2incomplete ip address</script>
        </abbr>
    </td>
    <td align="left">
        3128
    </td>
</tr>
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('89.145.199.64');</script>
        </abbr>
    </td>
    without port
</tr>
<tr data-proxy-id="00000000">
    <td align="left">
        without script
    </td>
    <td align="left">
        3128
    </td>
</tr>
"#;

    const INVALID_COUNTRY: &str = r#"
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('91.217.28.125');</script>
        </abbr>
    </td>
    <td align="left">
        3128
    </td>
    <td align="left">
        <img src="/assets/images/blank.gif" class="flag flag-ua inline-block align-middle" />
        Country is not available
    </td>
</tr>
<tr data-proxy-id="00000000">
    <td align="left">
        <abbr title="proxy.site.name">
            <script>document.write('89.145.199.64');</script>
        </abbr>
    </td>
    <td align="left">
        8080
    </td>
    <td align="left">
        <img src="/assets/images/blank.gif" class="flag flag-hu inline-block align-middle" alt="INVALID">
    </td>
</tr>
"#;

    /// Log sink shared with a test subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines_containing(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .filter(|line| line.contains(needle))
                .count()
        }
    }

    fn parse_with_logs(html: &str) -> (PageParse, CapturedLogs) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let page =
            tracing::subscriber::with_default(subscriber, || ProxyNovaProvider::parse_page(html));
        (page, logs)
    }

    fn provider() -> ProxyNovaProvider {
        ProxyNovaProvider::new(HttpClient::new(&HttpConfig::default()).unwrap())
    }

    #[test]
    fn test_parse_page() {
        let (page, logs) = parse_with_logs(PAGE);

        assert!(page.issues.is_empty());
        assert_eq!(logs.lines_containing("WARN"), 0);
        assert_eq!(
            page.proxies,
            vec![
                RawProxy::new("91.217.28.125:3128").with_country(Some("UA".to_string())),
                RawProxy::new("89.145.199.64:8080").with_country(Some("HU".to_string())),
            ]
        );
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let (page, logs) = parse_with_logs(INVALID_ROWS);

        assert!(page.proxies.is_empty());
        assert_eq!(
            page.issues,
            vec![
                RowIssue::InvalidScript,
                RowIssue::MissingPortCell,
                RowIssue::MissingScript,
            ]
        );
        assert!(page.issues.iter().all(RowIssue::skips_row));
        assert_eq!(logs.lines_containing("WARN"), 3);
        assert_eq!(logs.lines_containing("Skipping malformed row data"), 3);
    }

    #[test]
    fn test_invalid_country_keeps_row() {
        let page = ProxyNovaProvider::parse_page(INVALID_COUNTRY);

        assert_eq!(
            page.proxies,
            vec![
                RawProxy::new("91.217.28.125:3128"),
                RawProxy::new("89.145.199.64:8080"),
            ]
        );
        assert_eq!(
            page.issues,
            vec![
                RowIssue::MissingCountry,
                RowIssue::UnknownCountry("INVALID".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_empty_page() {
        let page = ProxyNovaProvider::parse_page("<html><body>maintenance</body></html>");
        assert!(page.proxies.is_empty());
        assert!(page.issues.is_empty());
    }

    #[test]
    fn test_request_url() {
        let provider = provider();
        assert_eq!(provider.request_url(None), BASE_URL);
        assert_eq!(
            provider.request_url(Some("ES")),
            "https://www.proxynova.com/proxy-server-list/country-es/"
        );
    }

    #[test]
    fn test_request_options() {
        let provider = provider();
        assert_eq!(provider.request_options(Some("ES")).request_id(), "ES");
        assert_eq!(provider.request_options(None).request_id(), "");
        assert!(provider.is_available());
        assert!(provider.credentials().is_none());
    }
}
