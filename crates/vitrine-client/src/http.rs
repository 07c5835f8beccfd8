use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;
use vitrine_core::error::CrawlError;
use vitrine_core::traits::{Action, BrowserSession, Query, SessionProvider};

/// Opens [`HttpSession`]s sharing one `reqwest` client.
///
/// A plain HTTP session sees the server-rendered markup only: no scripts
/// run, nothing can be clicked or scrolled. It suits `single` and
/// `url-increment` targets whose listings are in the initial HTML.
///
/// SSRF protection is **enabled** by default: navigations to private or
/// reserved addresses are refused. Use
/// [`allow_private_urls`](Self::allow_private_urls) to disable it (CLI
/// use, where the user controls the machine).
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    timeout: Duration,
    ssrf_protection: bool,
}

impl HttpProvider {
    pub fn new() -> Result<Self, CrawlError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(concat!("Vitrine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Session(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

impl SessionProvider for HttpProvider {
    type Session = HttpSession;

    async fn open(&self) -> Result<HttpSession, CrawlError> {
        Ok(HttpSession {
            client: self.client.clone(),
            timeout: self.timeout,
            ssrf_protection: self.ssrf_protection,
            page: Mutex::new(None),
        })
    }
}

struct LoadedPage {
    url: String,
    body: String,
}

/// Element handle: the query that matched and the match index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpElement {
    pub query: Query,
    pub index: usize,
}

/// A "page" that is the last fetched HTML document.
pub struct HttpSession {
    client: Client,
    timeout: Duration,
    ssrf_protection: bool,
    page: Mutex<Option<LoadedPage>>,
}

impl HttpSession {
    fn with_page<T>(
        &self,
        f: impl FnOnce(&LoadedPage) -> Result<T, CrawlError>,
    ) -> Result<T, CrawlError> {
        let page = self
            .page
            .lock()
            .map_err(|_| CrawlError::Session("page lock poisoned".into()))?;
        match page.as_ref() {
            Some(loaded) => f(loaded),
            None => Err(CrawlError::Session("no page loaded".into())),
        }
    }

    fn count(&self, query: &Query) -> Result<usize, CrawlError> {
        let Query::Css(css) = query else {
            return Err(CrawlError::Unsupported(format!(
                "{query}: XPath needs a browser session"
            )));
        };
        let selector = Selector::parse(css)
            .map_err(|e| CrawlError::Config(format!("Invalid selector '{css}': {e:?}")))?;
        self.with_page(|page| Ok(Html::parse_document(&page.body).select(&selector).count()))
    }

    #[cfg(test)]
    fn load(&self, url: &str, body: &str) {
        *self.page.lock().unwrap() = Some(LoadedPage {
            url: url.to_string(),
            body: body.to_string(),
        });
    }
}

impl BrowserSession for HttpSession {
    type Element = HttpElement;

    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        if self.ssrf_protection {
            validate_url(url).await?;
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CrawlError::Timeout(self.timeout.as_millis() as u64)
            } else {
                CrawlError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(CrawlError::Network(format!("HTTP {} for {url}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(CrawlError::ContentAbsent(format!(
                "HTTP {} for {url}",
                status.as_u16()
            )));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::Network(format!("Failed to read response body: {e}")))?;
        tracing::debug!(url = %final_url, bytes = body.len(), "Fetched page");

        let mut page = self
            .page
            .lock()
            .map_err(|_| CrawlError::Session("page lock poisoned".into()))?;
        *page = Some(LoadedPage {
            url: final_url,
            body,
        });
        Ok(())
    }

    async fn locate(&self, query: &Query) -> Result<Option<HttpElement>, CrawlError> {
        let found = self.count(query)?;
        Ok((found > 0).then(|| HttpElement {
            query: query.clone(),
            index: 0,
        }))
    }

    async fn locate_all(&self, query: &Query) -> Result<Vec<HttpElement>, CrawlError> {
        let found = self.count(query)?;
        Ok((0..found)
            .map(|index| HttpElement {
                query: query.clone(),
                index,
            })
            .collect())
    }

    async fn act(&self, element: &HttpElement, action: Action) -> Result<(), CrawlError> {
        Err(CrawlError::Unsupported(format!(
            "{action:?} on {} needs a browser session",
            element.query
        )))
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        self.with_page(|page| Ok(page.url.clone()))
    }

    async fn page_source(&self) -> Result<String, CrawlError> {
        self.with_page(|page| Ok(page.body.clone()))
    }

    async fn execute_probe(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        Err(CrawlError::Unsupported(format!(
            "script evaluation needs a browser session: {script}"
        )))
    }

    async fn close(&self) -> Result<(), CrawlError> {
        if let Ok(mut page) = self.page.lock() {
            page.take();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Refuse non-http(s) URLs and hosts resolving to private/reserved IPs.
async fn validate_url(url: &str) -> Result<(), CrawlError> {
    let parsed =
        Url::parse(url).map_err(|e| CrawlError::Config(format!("Invalid URL {url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(CrawlError::Config(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| CrawlError::Config(format!("URL has no host: {url}")))?;

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(CrawlError::Config(format!(
                "SSRF blocked: {host} is a private/reserved address"
            )));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| CrawlError::Network(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if let Some(private) = addrs.iter().find(|a| is_private_ip(a.ip())) {
        return Err(CrawlError::Config(format!(
            "SSRF blocked: {host} resolves to private/reserved IP {}",
            private.ip()
        )));
    }
    if addrs.is_empty() {
        return Err(CrawlError::Network(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFFC0) == 0xFE80
                || (first & 0xFE00) == 0xFC00
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
