//! Test utilities: scripted mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scraper::{Html, Selector};

use crate::error::CrawlError;
use crate::events::{CrawlEvent, CrawlReporter};
use crate::extractor::{ContainerLocator, Locator, LocatorMap};
use crate::models::{Field, Record};
use crate::pagination::Pagination;
use crate::readiness::ReadinessConfig;
use crate::retry::RetryPolicy;
use crate::sink::{ResultSink, Schema};
use crate::target::{CrawlTarget, OutputSpec};
use crate::traits::{Action, BrowserSession, Query, SessionProvider};

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    /// URL → markup. When non-empty, the page shown is the route of the
    /// current URL (empty markup for unknown URLs).
    routes: HashMap<String, String>,
    /// Sequential pages for in-place loading; a successful click moves to
    /// the next one.
    pages: Vec<String>,
    page_index: usize,
    current_url: Option<String>,
    sizes: VecDeque<f64>,
    last_size: Option<f64>,
    click_failures: u32,
    scroll_into_view_fails: bool,
    navigate_failures: u32,
    /// URLs whose navigation always fails with a network error.
    unreachable: Vec<String>,

    navigations: Vec<String>,
    clicks: u32,
    click_attempts: u32,
    locate_calls: u32,
    scrolls: u32,
    size_probes: u32,
    closed: bool,
}

impl MockState {
    fn markup(&self) -> String {
        if !self.routes.is_empty() {
            return self
                .current_url
                .as_ref()
                .and_then(|url| self.routes.get(url))
                .cloned()
                .unwrap_or_default();
        }
        self.pages.get(self.page_index).cloned().unwrap_or_default()
    }
}

/// Element handle: the query that located it and its match index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    pub query: Query,
    pub index: usize,
}

/// Scripted browser page.
///
/// CSS queries are evaluated against the current markup with `scraper`.
/// XPath queries only understand `contains(text(), '...')`: they match
/// when the quoted text occurs in the markup.
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    /// Pages served in order, advanced by clicks.
    pub fn with_pages<T: Into<String>>(pages: Vec<T>) -> Self {
        let session = Self::default();
        session.state.lock().unwrap().pages = pages.into_iter().map(Into::into).collect();
        session
    }

    /// Markup per URL, selected by navigation.
    pub fn with_routes<U: Into<String>, M: Into<String>>(routes: Vec<(U, M)>) -> Self {
        let session = Self::default();
        session.state.lock().unwrap().routes = routes
            .into_iter()
            .map(|(u, m)| (u.into(), m.into()))
            .collect();
        session
    }

    /// Values returned by successive size probes. Once drained the last
    /// value repeats; with no sizes the probe returns the markup length.
    pub fn with_sizes(self, sizes: Vec<f64>) -> Self {
        self.state.lock().unwrap().sizes = sizes.into();
        self
    }

    /// The next `n` clicks fail as intercepted.
    pub fn with_click_failures(self, n: u32) -> Self {
        self.state.lock().unwrap().click_failures = n;
        self
    }

    /// Every scroll-into-view action fails.
    pub fn with_scroll_into_view_failing(self) -> Self {
        self.state.lock().unwrap().scroll_into_view_fails = true;
        self
    }

    /// The next `n` navigations fail with a network error.
    pub fn with_navigate_failures(self, n: u32) -> Self {
        self.state.lock().unwrap().navigate_failures = n;
        self
    }

    /// Navigations to `url` always fail with a network error.
    pub fn with_unreachable(self, url: &str) -> Self {
        self.state.lock().unwrap().unreachable.push(url.to_string());
        self
    }

    /// Set the current URL without recording a navigation.
    pub fn navigate_now(&self, url: &str) {
        self.state.lock().unwrap().current_url = Some(url.to_string());
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    /// Successful clicks.
    pub fn clicks(&self) -> u32 {
        self.state.lock().unwrap().clicks
    }

    /// Click actions issued, failed ones included.
    pub fn click_attempts(&self) -> u32 {
        self.state.lock().unwrap().click_attempts
    }

    pub fn locate_calls(&self) -> u32 {
        self.state.lock().unwrap().locate_calls
    }

    pub fn scrolls(&self) -> u32 {
        self.state.lock().unwrap().scrolls
    }

    pub fn size_probes(&self) -> u32 {
        self.state.lock().unwrap().size_probes
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn matches(&self, query: &Query) -> Result<usize, CrawlError> {
        let markup = {
            let mut state = self.state.lock().unwrap();
            state.locate_calls += 1;
            state.markup()
        };
        match query {
            Query::Css(css) => {
                let selector = Selector::parse(css)
                    .map_err(|e| CrawlError::Config(format!("Invalid selector {css}: {e}")))?;
                Ok(Html::parse_document(&markup).select(&selector).count())
            }
            Query::XPath(xpath) => {
                let needle = xpath.split('\'').nth(1).unwrap_or_default();
                Ok(usize::from(!needle.is_empty() && markup.contains(needle)))
            }
        }
    }
}

impl BrowserSession for MockSession {
    type Element = MockElement;

    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        if state.navigate_failures > 0 {
            state.navigate_failures -= 1;
            return Err(CrawlError::Network("connection reset".into()));
        }
        if state.unreachable.iter().any(|u| u == url) {
            return Err(CrawlError::Network(format!("{url} unreachable")));
        }
        state.current_url = Some(url.to_string());
        Ok(())
    }

    async fn locate(&self, query: &Query) -> Result<Option<MockElement>, CrawlError> {
        let found = self.matches(query)?;
        Ok((found > 0).then(|| MockElement {
            query: query.clone(),
            index: 0,
        }))
    }

    async fn locate_all(&self, query: &Query) -> Result<Vec<MockElement>, CrawlError> {
        let found = self.matches(query)?;
        Ok((0..found)
            .map(|index| MockElement {
                query: query.clone(),
                index,
            })
            .collect())
    }

    async fn act(&self, _element: &MockElement, action: Action) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        match action {
            Action::ScrollIntoView if state.scroll_into_view_fails => {
                Err(CrawlError::Interaction("element not scrollable".into()))
            }
            Action::ScrollIntoView => Ok(()),
            Action::Click => {
                state.click_attempts += 1;
                if state.click_failures > 0 {
                    state.click_failures -= 1;
                    return Err(CrawlError::Interaction("element click intercepted".into()));
                }
                state.clicks += 1;
                if state.page_index + 1 < state.pages.len() {
                    state.page_index += 1;
                }
                Ok(())
            }
        }
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        self.state
            .lock()
            .unwrap()
            .current_url
            .clone()
            .ok_or_else(|| CrawlError::Session("no page loaded".into()))
    }

    async fn page_source(&self) -> Result<String, CrawlError> {
        Ok(self.state.lock().unwrap().markup())
    }

    async fn execute_probe(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        let mut state = self.state.lock().unwrap();
        if script.contains("scrollBy") {
            state.scrolls += 1;
            return Ok(serde_json::Value::Null);
        }
        state.size_probes += 1;
        let size = match state.sizes.pop_front() {
            Some(size) => {
                state.last_size = Some(size);
                size
            }
            None => state.last_size.unwrap_or(state.markup().len() as f64),
        };
        Ok(serde_json::json!(size))
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSessionProvider
// ---------------------------------------------------------------------------

/// Hands out clones of one scripted session.
#[derive(Clone)]
pub struct MockSessionProvider {
    session: MockSession,
    open_error: Arc<Mutex<Option<CrawlError>>>,
    opened: Arc<Mutex<u32>>,
}

impl MockSessionProvider {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            open_error: Arc::new(Mutex::new(None)),
            opened: Arc::new(Mutex::new(0)),
        }
    }

    /// The first `open` fails with `error`.
    pub fn with_open_error(error: CrawlError) -> Self {
        let provider = Self::new(MockSession::default());
        *provider.open_error.lock().unwrap() = Some(error);
        provider
    }

    pub fn opened(&self) -> u32 {
        *self.opened.lock().unwrap()
    }
}

impl SessionProvider for MockSessionProvider {
    type Session = MockSession;

    async fn open(&self) -> Result<MockSession, CrawlError> {
        if let Some(e) = self.open_error.lock().unwrap().take() {
            return Err(e);
        }
        *self.opened.lock().unwrap() += 1;
        Ok(self.session.clone())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock sink that records row counts instead of writing files.
#[derive(Clone, Default)]
pub struct MockSink {
    pub written: Arc<Mutex<Vec<Vec<Record>>>>,
    error: Arc<Mutex<Option<CrawlError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(error: CrawlError) -> Self {
        let sink = Self::default();
        *sink.error.lock().unwrap() = Some(error);
        sink
    }

    /// Rows per write call, in call order.
    pub fn writes(&self) -> Vec<usize> {
        self.written.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl ResultSink for MockSink {
    fn write(&self, records: &[Record], _schema: &Schema) -> Result<usize, CrawlError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.written.lock().unwrap().push(records.to_vec());
        Ok(records.len())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock crawl reporter that records event names.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match &event {
            CrawlEvent::TargetStarted { .. } => "TargetStarted",
            CrawlEvent::SourceStarted { .. } => "SourceStarted",
            CrawlEvent::PageExtracted { .. } => "PageExtracted",
            CrawlEvent::SourceFinished { .. } => "SourceFinished",
            CrawlEvent::BelowExpected { .. } => "BelowExpected",
            CrawlEvent::TargetFinished { .. } => "TargetFinished",
            CrawlEvent::TargetFailed { .. } => "TargetFailed",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Readiness settings with millisecond waits.
pub fn fast_readiness() -> ReadinessConfig {
    ReadinessConfig {
        presence_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
        settle_delay: Duration::from_millis(1),
        stable_probes: 2,
        max_probes: 10,
        ..ReadinessConfig::default()
    }
}

/// Two retries, 1 ms apart.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1))
}

fn css(selector: &str) -> Vec<Locator> {
    vec![Locator::Css {
        selector: selector.into(),
        attr: None,
    }]
}

/// A paginated VTEX-style grocery target with prices.
pub fn santaluzia_target() -> CrawlTarget {
    let mut fields = BTreeMap::new();
    fields.insert(
        Field::Description,
        css("span.vtex-product-summary-2-x-productBrand"),
    );
    fields.insert(
        Field::Link,
        vec![Locator::Css {
            selector: "a.vtex-product-summary-2-x-clearLink".into(),
            attr: Some("href".into()),
        }],
    );
    fields.insert(
        Field::PriceInteger,
        css("span.vtex-product-price-1-x-currencyInteger"),
    );
    fields.insert(
        Field::PriceDecimal,
        css("span.vtex-product-price-1-x-currencyDecimal"),
    );
    fields.insert(
        Field::PriceFraction,
        css("span.vtex-product-price-1-x-currencyFraction"),
    );

    CrawlTarget {
        name: "santaluzia".into(),
        urls: vec!["https://www.santaluzia.com.br/eua".into()],
        site_root: Some("https://www.santaluzia.com.br".into()),
        pagination: Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: None,
        },
        ready: vec![Query::Css("div.vtex-search-result-3-x-galleryItem".into())],
        not_found: Some("div.vtex-search-result-3-x-searchNotFound".into()),
        locators: LocatorMap {
            containers: vec![ContainerLocator::Css {
                selector: "div.vtex-search-result-3-x-galleryItem".into(),
            }],
            fields,
        },
        predicate: None,
        category: None,
        dedup: Default::default(),
        prescroll: false,
        expected_min_records: None,
        output: OutputSpec {
            path: "santaluzia_eua.csv".into(),
            columns: Schema::default(),
            delimiter: None,
        },
    }
}
