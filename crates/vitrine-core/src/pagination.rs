//! Drives one start URL through its loading strategy.
//!
//! # Phases
//!
//! ```text
//! LOADING --[ready]--> EXTRACTING --> DECIDING --[advance]--> LOADING
//!    |                                    |
//!    +--[retries exhausted/cancelled]--> DONE <--[terminated]--+
//! ```
//!
//! Every LOADING step runs under the retry policy. Extraction never starts
//! before the load step reports ready, and the next load never starts
//! before the current snapshot has been harvested.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::CrawlError;
use crate::events::{CrawlEvent, CrawlReporter};
use crate::harvest::{Harvester, PageHarvest};
use crate::models::PageUrls;
use crate::normalize::site_root;
use crate::readiness::{Readiness, ReadinessGate};
use crate::retry::{Attempt, RetryPolicy};
use crate::traits::{Action, BrowserSession, Query};

fn default_page_param() -> String {
    "page".into()
}

fn default_start() -> u32 {
    1
}

fn default_max_clicks() -> u32 {
    50
}

fn default_max_cycles() -> u32 {
    30
}

/// Loading strategy of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Pagination {
    /// One page, no advancement.
    Single,
    /// Page ordinal in a `{page}` URL placeholder or a query parameter.
    UrlIncrement {
        #[serde(default = "default_page_param")]
        param: String,
        #[serde(default = "default_start")]
        start: u32,
        /// Number of pages to visit at most.
        #[serde(default)]
        max_pages: Option<u32>,
    },
    /// A "show more" control appends items to the same page.
    ClickToLoad {
        control: Vec<Query>,
        #[serde(default = "default_max_clicks")]
        max_clicks: u32,
    },
    /// Content appears as the page is scrolled.
    ScrollInfinite {
        #[serde(default = "default_max_cycles")]
        max_cycles: u32,
    },
    /// Numbered pagination links clicked in place. Queries may contain
    /// `{page}`, filled with the next ordinal.
    ClickNext {
        control: Vec<Query>,
        #[serde(default)]
        max_pages: Option<u32>,
    },
}

impl Pagination {
    pub fn label(&self) -> &'static str {
        match self {
            Pagination::Single => "single",
            Pagination::UrlIncrement { .. } => "url-increment",
            Pagination::ClickToLoad { .. } => "click-to-load",
            Pagination::ScrollInfinite { .. } => "scroll-infinite",
            Pagination::ClickNext { .. } => "click-next",
        }
    }

    fn first_page(&self) -> u32 {
        match self {
            Pagination::UrlIncrement { start, .. } => *start,
            _ => 1,
        }
    }
}

/// Why a start URL stopped producing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// The strategy ran out of content: control gone, page stable, single
    /// page read.
    Exhausted,
    /// The page showed the "not found" marker.
    NotFound,
    /// The page loaded but held no record containers.
    NoContainers,
    /// Page, click or scroll-cycle bound reached.
    PageLimit,
    /// Loading kept failing transiently.
    RetriesExhausted,
    /// Loading failed with a non-transient error.
    Failed,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Exhausted => "exhausted",
            Termination::NotFound => "not-found",
            Termination::NoContainers => "no-containers",
            Termination::PageLimit => "page-limit",
            Termination::RetriesExhausted => "retries-exhausted",
            Termination::Failed => "failed",
            Termination::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Build the URL of page `page` from a start URL.
///
/// A `{page}` placeholder is substituted; otherwise query parameter
/// `param` is set, replacing any existing value.
pub fn page_url(start_url: &str, param: &str, page: u32) -> Result<String, CrawlError> {
    if start_url.contains("{page}") {
        return Ok(start_url.replace("{page}", &page.to_string()));
    }
    let mut url = Url::parse(start_url)
        .map_err(|e| CrawlError::Config(format!("Invalid start URL {start_url}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, &page.to_string());
    Ok(url.into())
}

/// Controller phase, exposed for tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Loading(Step),
    Extracting,
    Deciding(PageHarvest),
    Done(Termination),
}

/// What the next LOADING phase does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Navigate(String),
    /// Click a control, then wait for the page to settle (or for presence
    /// markers when the click replaces the page).
    Click { control: Vec<Query>, replaces_page: bool },
    /// No action; wait for in-flight content to settle.
    Settle,
    /// One scroll-and-measure cycle.
    Scroll,
}

/// Result of crawling one start URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub url: String,
    /// Snapshots extracted.
    pub pages: u32,
    pub termination: Termination,
    pub best_effort: bool,
}

#[derive(Debug)]
struct LoopState {
    page: u32,
    snapshots: u32,
    advances: u32,
    last_containers: Option<usize>,
    last_verdict: Readiness,
    best_effort: bool,
    start_url: String,
    last_url: String,
}

/// Loading-strategy state machine for one target.
pub struct PaginationController<'a> {
    target: &'a str,
    pagination: &'a Pagination,
    ready: &'a [Query],
    prescroll: bool,
    site_root: Option<&'a Url>,
    gate: &'a ReadinessGate,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> PaginationController<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: &'a str,
        pagination: &'a Pagination,
        ready: &'a [Query],
        prescroll: bool,
        site_root: Option<&'a Url>,
        gate: &'a ReadinessGate,
        retry: &'a RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            target,
            pagination,
            ready,
            prescroll,
            site_root,
            gate,
            retry,
            cancel,
        }
    }

    /// Crawl `start_url` until the strategy terminates, feeding every
    /// snapshot to `harvester`.
    pub async fn run<S: BrowserSession, R: CrawlReporter>(
        &self,
        session: &S,
        start_url: &str,
        harvester: &mut Harvester,
        reporter: &R,
    ) -> SourceOutcome {
        let first_page = self.pagination.first_page();
        let first_url = match self.pagination {
            Pagination::UrlIncrement { param, .. } => page_url(start_url, param, first_page),
            _ => Ok(start_url.to_string()),
        };
        let first_url = match first_url {
            Ok(u) => u,
            Err(e) => {
                tracing::error!(site = %self.target, error = %e, "Cannot build first page URL");
                return SourceOutcome {
                    url: start_url.to_string(),
                    pages: 0,
                    termination: Termination::Failed,
                    best_effort: false,
                };
            }
        };

        let mut state = LoopState {
            page: first_page,
            snapshots: 0,
            advances: 0,
            last_containers: None,
            last_verdict: Readiness::Ready,
            best_effort: false,
            start_url: start_url.to_string(),
            last_url: first_url.clone(),
        };
        let mut phase = Phase::Loading(Step::Navigate(first_url));

        let termination = loop {
            tracing::trace!(site = %self.target, ?phase, "Phase");
            phase = match phase {
                Phase::Loading(step) => match self.load(session, &step, &mut state).await {
                    Ok(()) if self.cancel.is_cancelled() => Phase::Done(Termination::Cancelled),
                    Ok(()) => Phase::Extracting,
                    Err(termination) => Phase::Done(termination),
                },
                Phase::Extracting => match self.extract(session, &mut state, harvester).await {
                    Ok(harvest) => {
                        reporter.report(CrawlEvent::PageExtracted {
                            target: self.target,
                            page: state.page,
                            containers: harvest.containers,
                            accepted: harvest.accepted,
                            total: harvester.total(),
                        });
                        Phase::Deciding(harvest)
                    }
                    Err(termination) => Phase::Done(termination),
                },
                Phase::Deciding(harvest) => self.decide(session, harvest, &mut state).await,
                Phase::Done(termination) => break termination,
            };
        };

        SourceOutcome {
            url: start_url.to_string(),
            pages: state.snapshots,
            termination,
            best_effort: state.best_effort,
        }
    }

    async fn load<S: BrowserSession>(
        &self,
        session: &S,
        step: &Step,
        state: &mut LoopState,
    ) -> Result<(), Termination> {
        let gate = self.gate;
        let ready = self.ready;

        let attempt = match step {
            Step::Navigate(url) => {
                state.last_url = url.clone();
                let navigated = self
                    .retry
                    .with_retry("navigate", move || session.navigate(url))
                    .await;
                // A presence timeout is never retried; extraction decides
                // how the source ends.
                if matches!(navigated, Attempt::Succeeded(()))
                    && gate.await_presence(session, ready).await == Readiness::TimedOut
                {
                    tracing::info!(site = %self.target, %url, "Presence markers never appeared");
                }
                navigated
            }
            Step::Click {
                control,
                replaces_page,
            } => {
                let control = control.as_slice();
                let replaces_page = *replaces_page;
                let clicked = self
                    .retry
                    .with_retry("click", move || async move {
                        let element = find_control(session, control).await.ok_or_else(|| {
                            CrawlError::ControlAbsent("no pagination control located".into())
                        })?;
                        if let Err(e) = session.act(&element, Action::ScrollIntoView).await {
                            tracing::debug!(error = %e, "Scroll to control failed");
                        }
                        session.act(&element, Action::Click).await
                    })
                    .await;
                match clicked {
                    Attempt::Succeeded(()) if replaces_page => {
                        if gate.await_presence(session, ready).await == Readiness::TimedOut {
                            tracing::info!(
                                site = %self.target,
                                page = state.page,
                                "Presence markers never appeared after click"
                            );
                        }
                        Attempt::Succeeded(())
                    }
                    Attempt::Succeeded(()) => {
                        state.last_verdict = gate.await_stable(session, false).await;
                        Attempt::Succeeded(())
                    }
                    other => other,
                }
            }
            Step::Settle => {
                state.last_verdict = gate.await_stable(session, false).await;
                Attempt::Succeeded(())
            }
            Step::Scroll => {
                state.last_verdict = gate.await_stable(session, true).await;
                Attempt::Succeeded(())
            }
        };

        match attempt {
            Attempt::Succeeded(()) => {}
            Attempt::Failed(CrawlError::ControlAbsent(reason)) => {
                tracing::info!(site = %self.target, %reason, "Pagination control gone");
                return Err(Termination::Exhausted);
            }
            Attempt::Failed(e) => {
                tracing::warn!(site = %self.target, error = %e, "Loading failed");
                return Err(Termination::Failed);
            }
            Attempt::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    site = %self.target,
                    attempts,
                    error = %last_error,
                    "Giving up on this source"
                );
                return Err(Termination::RetriesExhausted);
            }
        }

        if state.last_verdict == Readiness::BestEffort {
            state.best_effort = true;
        }

        if self.prescroll
            && matches!(step, Step::Navigate(_) | Step::Click { .. })
            && gate.await_stable(session, true).await == Readiness::BestEffort
        {
            state.best_effort = true;
        }

        Ok(())
    }

    async fn extract<S: BrowserSession>(
        &self,
        session: &S,
        state: &mut LoopState,
        harvester: &mut Harvester,
    ) -> Result<PageHarvest, Termination> {
        let markup = match self
            .retry
            .with_retry("page_source", || session.page_source())
            .await
        {
            Attempt::Succeeded(markup) => markup,
            Attempt::Exhausted { last_error, .. } | Attempt::Failed(last_error) => {
                tracing::warn!(site = %self.target, error = %last_error, "Cannot read page source");
                return Err(Termination::Failed);
            }
        };

        let current = match session.current_url().await {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!(error = %e, "current_url failed, using requested URL");
                state.last_url.clone()
            }
        };
        let urls = match self.page_urls(&current) {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(site = %self.target, error = %e, url = %current, "Unusable page URL");
                return Err(Termination::Failed);
            }
        };

        let harvest = harvester.harvest(state.page, urls, &markup);
        if !harvest.not_found {
            state.snapshots += 1;
        }
        Ok(harvest)
    }

    fn page_urls(&self, current: &str) -> Result<PageUrls, CrawlError> {
        let current = Url::parse(current)
            .map_err(|e| CrawlError::Config(format!("Invalid page URL {current}: {e}")))?;
        let site_root = match self.site_root {
            Some(root) => root.clone(),
            None => site_root(&current)?,
        };
        Ok(PageUrls { site_root, current })
    }

    async fn decide<S: BrowserSession>(
        &self,
        session: &S,
        harvest: PageHarvest,
        state: &mut LoopState,
    ) -> Phase {
        let grew = state
            .last_containers
            .is_none_or(|previous| harvest.containers > previous);
        state.last_containers = Some(harvest.containers);

        match self.pagination {
            Pagination::Single => Phase::Done(Termination::Exhausted),

            Pagination::UrlIncrement {
                param,
                start,
                max_pages,
            } => {
                if harvest.not_found {
                    return Phase::Done(Termination::NotFound);
                }
                if harvest.containers == 0 {
                    return Phase::Done(Termination::NoContainers);
                }
                if max_pages
                    .is_some_and(|max| state.page.saturating_add(1) >= start.saturating_add(max))
                {
                    return Phase::Done(Termination::PageLimit);
                }
                state.page = state.page.saturating_add(1);
                match page_url(&state.start_url, param, state.page) {
                    Ok(url) => Phase::Loading(Step::Navigate(url)),
                    Err(e) => {
                        tracing::warn!(site = %self.target, error = %e, "Cannot build next page URL");
                        Phase::Done(Termination::Failed)
                    }
                }
            }

            Pagination::ClickToLoad {
                control,
                max_clicks,
            } => {
                let present = find_control(session, control).await.is_some();
                if !present && !grew {
                    tracing::info!(
                        site = %self.target,
                        containers = harvest.containers,
                        "No load-more control and no new items"
                    );
                    return Phase::Done(Termination::Exhausted);
                }
                if state.advances >= *max_clicks {
                    return Phase::Done(Termination::PageLimit);
                }
                state.advances += 1;
                state.page = state.page.saturating_add(1);
                if present {
                    Phase::Loading(Step::Click {
                        control: control.clone(),
                        replaces_page: false,
                    })
                } else {
                    Phase::Loading(Step::Settle)
                }
            }

            Pagination::ScrollInfinite { max_cycles } => {
                if state.advances > 0 && state.last_verdict == Readiness::Ready {
                    return Phase::Done(Termination::Exhausted);
                }
                if state.advances >= *max_cycles {
                    return Phase::Done(Termination::PageLimit);
                }
                state.advances += 1;
                state.page = state.page.saturating_add(1);
                Phase::Loading(Step::Scroll)
            }

            Pagination::ClickNext { control, max_pages } => {
                if harvest.containers == 0 {
                    return Phase::Done(Termination::NoContainers);
                }
                if max_pages.is_some_and(|max| state.page >= max) {
                    return Phase::Done(Termination::PageLimit);
                }
                let next = state.page.saturating_add(1);
                let control: Vec<Query> = control.iter().map(|q| q.with_page(next)).collect();
                if find_control(session, &control).await.is_none() {
                    tracing::info!(site = %self.target, page = next, "No link to next page");
                    return Phase::Done(Termination::Exhausted);
                }
                state.page = next;
                state.advances += 1;
                Phase::Loading(Step::Click {
                    control,
                    replaces_page: true,
                })
            }
        }
    }
}

async fn find_control<S: BrowserSession>(session: &S, control: &[Query]) -> Option<S::Element> {
    for query in control {
        match session.locate(query).await {
            Ok(Some(element)) => return Some(element),
            Ok(None) => {}
            Err(e) => tracing::debug!(%query, error = %e, "Control lookup failed"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dedup::KeyPolicy;
    use crate::extractor::{ContainerLocator, Locator, LocatorMap, RecordExtractor};
    use crate::models::Field;
    use crate::normalize::Normalizer;
    use crate::testutil::{MockReporter, MockSession, fast_readiness, fast_retry};

    fn harvester() -> Harvester {
        let mut fields = BTreeMap::new();
        fields.insert(
            Field::Description,
            vec![Locator::Css {
                selector: "span".into(),
                attr: None,
            }],
        );
        let map = LocatorMap {
            containers: vec![ContainerLocator::Css {
                selector: "a.item".into(),
            }],
            fields,
        };
        Harvester::new(
            RecordExtractor::new(&map).unwrap(),
            Normalizer::default(),
            Some("div.searchNotFound"),
            KeyPolicy::FullUrl,
        )
        .unwrap()
    }

    fn items(range: std::ops::Range<u32>) -> String {
        range
            .map(|i| format!(r#"<a class="item" href="/p/{i}"><span>Item {i}</span></a>"#))
            .collect()
    }

    fn markers() -> Vec<Query> {
        vec![
            Query::Css("a.item".into()),
            Query::Css("div.searchNotFound".into()),
        ]
    }

    async fn run(
        session: &MockSession,
        pagination: Pagination,
        start: &str,
    ) -> (SourceOutcome, Harvester) {
        run_with(session, pagination, start, markers()).await
    }

    async fn run_with(
        session: &MockSession,
        pagination: Pagination,
        start: &str,
        ready: Vec<Query>,
    ) -> (SourceOutcome, Harvester) {
        let gate = ReadinessGate::new(fast_readiness());
        let retry = fast_retry();
        let cancel = CancellationToken::new();
        let controller = PaginationController::new(
            "test",
            &pagination,
            &ready,
            false,
            None,
            &gate,
            &retry,
            &cancel,
        );
        let mut h = harvester();
        let outcome = controller
            .run(session, start, &mut h, &MockReporter::new())
            .await;
        (outcome, h)
    }

    #[test]
    fn page_url_sets_or_replaces_param() {
        assert_eq!(
            page_url("https://k.com/produtos?q=estados&page=1", "page", 3).unwrap(),
            "https://k.com/produtos?q=estados&page=3"
        );
        assert_eq!(
            page_url("https://k.com/busca", "pg", 2).unwrap(),
            "https://k.com/busca?pg=2"
        );
        assert_eq!(
            page_url("https://k.com/p/{page}/list", "page", 5).unwrap(),
            "https://k.com/p/5/list"
        );
        assert!(page_url("not a url", "page", 1).is_err());
    }

    #[tokio::test]
    async fn url_increment_stops_at_not_found() {
        let session = MockSession::with_routes(vec![
            ("https://s.com/c?page=1", items(0..3)),
            ("https://s.com/c?page=2", items(3..6)),
            ("https://s.com/c?page=3", items(6..8)),
            (
                "https://s.com/c?page=4",
                r#"<div class="searchNotFound">Nenhum produto</div>"#.to_string(),
            ),
            ("https://s.com/c?page=5", items(8..10)),
        ]);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: None,
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;

        assert_eq!(outcome.termination, Termination::NotFound);
        assert_eq!(outcome.pages, 3);
        assert_eq!(h.total(), 8);
        assert_eq!(
            session.navigations(),
            vec![
                "https://s.com/c?page=1",
                "https://s.com/c?page=2",
                "https://s.com/c?page=3",
                "https://s.com/c?page=4",
            ]
        );
    }

    #[tokio::test]
    async fn url_increment_stops_when_containers_absent() {
        let session = MockSession::with_routes(vec![
            ("https://s.com/c?page=1", items(0..2)),
            ("https://s.com/c?page=2", "<p>empty grid</p>".to_string()),
        ]);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: None,
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;
        assert_eq!(outcome.termination, Termination::NoContainers);
        assert_eq!(h.total(), 2);
        // The empty page is read once, not retried until the budget runs out.
        assert_eq!(
            session.navigations(),
            vec!["https://s.com/c?page=1", "https://s.com/c?page=2"]
        );
    }

    #[tokio::test]
    async fn url_increment_without_markers_on_first_page() {
        let session =
            MockSession::with_routes(vec![("https://s.com/c?page=1", "<p>maintenance</p>")]);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: Some(8),
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;
        assert_eq!(outcome.termination, Termination::NoContainers);
        assert_eq!(outcome.pages, 1);
        assert_eq!(h.total(), 0);
        assert_eq!(session.navigations().len(), 1);
    }

    #[tokio::test]
    async fn url_increment_page_limit_near_u32_max() {
        let session = MockSession::with_routes(vec![(
            "https://s.com/c?page=4294967295",
            items(0..2),
        )]);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: u32::MAX,
            max_pages: Some(u32::MAX),
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;
        assert_eq!(outcome.termination, Termination::PageLimit);
        assert_eq!(h.total(), 2);
    }

    #[tokio::test]
    async fn url_increment_respects_max_pages() {
        let session = MockSession::with_routes(vec![
            ("https://s.com/c?page=1", items(0..2)),
            ("https://s.com/c?page=2", items(2..4)),
            ("https://s.com/c?page=3", items(4..6)),
        ]);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: Some(2),
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;
        assert_eq!(outcome.termination, Termination::PageLimit);
        assert_eq!(outcome.pages, 2);
        assert_eq!(h.total(), 4);
    }

    #[tokio::test]
    async fn click_to_load_until_control_gone() {
        let more = r#"<button class="more">Mostrar mais</button>"#;
        let session = MockSession::with_pages(vec![
            format!("{}{more}", items(0..4)),
            format!("{}{more}", items(0..8)),
            items(0..10),
        ]);
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 10,
        };
        let (outcome, h) = run(&session, pagination, "https://z.com/americanos").await;

        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(h.total(), 10);
        assert_eq!(session.clicks(), 2);
        // Third snapshot grew without a control, one settle pass confirms.
        assert_eq!(outcome.pages, 4);
    }

    #[tokio::test]
    async fn click_to_load_terminates_without_action_when_unchanged_and_absent() {
        let session = MockSession::with_pages(vec![items(0..4)]);
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 10,
        };
        let (outcome, _) = run(&session, pagination, "https://z.com/americanos").await;
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(session.clicks(), 0);
        assert_eq!(session.click_attempts(), 0);
        assert_eq!(outcome.pages, 2);
    }

    #[tokio::test]
    async fn click_to_load_retries_blocked_clicks() {
        let more = r#"<button class="more">Mostrar mais</button>"#;
        let session = MockSession::with_pages(vec![format!("{}{more}", items(0..2)), items(0..4)])
            .with_click_failures(2);
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 10,
        };
        let (outcome, h) = run(&session, pagination, "https://a.com/eua").await;
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(session.click_attempts(), 3);
        assert_eq!(session.clicks(), 1);
        assert_eq!(h.total(), 4);
    }

    #[tokio::test]
    async fn click_to_load_clicks_even_if_scroll_into_view_fails() {
        let more = r#"<button class="more">Mostrar mais</button>"#;
        let session = MockSession::with_pages(vec![format!("{}{more}", items(0..2)), items(0..4)])
            .with_scroll_into_view_failing();
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 10,
        };
        let (outcome, h) = run(&session, pagination, "https://a.com/eua").await;
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(session.clicks(), 1);
        assert_eq!(h.total(), 4);
    }

    #[tokio::test]
    async fn click_to_load_gives_up_after_retry_budget() {
        let more = r#"<button class="more">Mostrar mais</button>"#;
        let session = MockSession::with_pages(vec![format!("{}{more}", items(0..2)), items(0..4)])
            .with_click_failures(10);
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 10,
        };
        let (outcome, h) = run(&session, pagination, "https://a.com/eua").await;
        assert_eq!(outcome.termination, Termination::RetriesExhausted);
        assert_eq!(session.click_attempts(), 3);
        assert_eq!(h.total(), 2);
    }

    #[tokio::test]
    async fn click_to_load_is_capped() {
        let more = r#"<button class="more">Mostrar mais</button>"#;
        let pages = (1..20).map(|n| format!("{}{more}", items(0..n * 2))).collect();
        let session = MockSession::with_pages(pages);
        let pagination = Pagination::ClickToLoad {
            control: vec![Query::Css("button.more".into())],
            max_clicks: 3,
        };
        let (outcome, _) = run(&session, pagination, "https://a.com/eua").await;
        assert_eq!(outcome.termination, Termination::PageLimit);
        assert_eq!(session.clicks(), 3);
    }

    #[tokio::test]
    async fn scroll_infinite_ends_when_stable() {
        let session = MockSession::with_pages(vec![items(0..6)])
            .with_sizes(vec![1000.0, 1500.0, 1500.0, 1500.0]);
        let pagination = Pagination::ScrollInfinite { max_cycles: 5 };
        let (outcome, h) = run(&session, pagination, "https://m.com/pais/eua").await;
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.pages, 2);
        assert!(!outcome.best_effort);
        assert_eq!(h.total(), 6);
    }

    #[tokio::test]
    async fn scroll_infinite_bounded_by_cycles() {
        let sizes = (0..500).map(|i| f64::from(i) * 10.0).collect();
        let session = MockSession::with_pages(vec![items(0..6)]).with_sizes(sizes);
        let pagination = Pagination::ScrollInfinite { max_cycles: 2 };
        let (outcome, _) = run(&session, pagination, "https://m.com/pais/eua").await;
        assert_eq!(outcome.termination, Termination::PageLimit);
        assert_eq!(outcome.pages, 3);
        assert!(outcome.best_effort);
    }

    #[tokio::test]
    async fn click_next_follows_numbered_links() {
        let link = |n: u32| format!(r#"<a class="Pagination-link" aria-label="Page {n}">{n}</a>"#);
        let session = MockSession::with_pages(vec![
            format!("{}{}", items(0..3), link(2)),
            format!("{}{}", items(3..6), link(3)),
            items(6..7),
        ]);
        let pagination = Pagination::ClickNext {
            control: vec![Query::Css("a.Pagination-link[aria-label='Page {page}']".into())],
            max_pages: Some(5),
        };
        let (outcome, h) = run(&session, pagination, "https://m.com/pais/eua").await;
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.pages, 3);
        assert_eq!(h.total(), 7);
        assert_eq!(session.clicks(), 2);
    }

    #[tokio::test]
    async fn click_next_ends_when_next_page_stays_empty() {
        let link = r#"<a class="Pagination-link" aria-label="Page 2">2</a>"#;
        let session = MockSession::with_pages(vec![
            format!("{}{link}", items(0..3)),
            "<p>loading forever</p>".to_string(),
        ]);
        let pagination = Pagination::ClickNext {
            control: vec![Query::Css("a.Pagination-link[aria-label='Page {page}']".into())],
            max_pages: None,
        };
        let (outcome, h) = run(&session, pagination, "https://m.com/pais/eua").await;
        assert_eq!(outcome.termination, Termination::NoContainers);
        assert_eq!(session.clicks(), 1);
        assert_eq!(h.total(), 3);
    }

    #[tokio::test]
    async fn navigation_failures_end_source_gracefully() {
        let session = MockSession::with_routes(vec![("https://s.com/c?page=1", items(0..2))])
            .with_navigate_failures(10);
        let pagination = Pagination::UrlIncrement {
            param: "page".into(),
            start: 1,
            max_pages: None,
        };
        let (outcome, h) = run(&session, pagination, "https://s.com/c").await;
        assert_eq!(outcome.termination, Termination::RetriesExhausted);
        assert_eq!(outcome.pages, 0);
        assert_eq!(h.total(), 0);
        assert_eq!(session.navigations().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_extraction() {
        let session = MockSession::with_pages(vec![items(0..2)]);
        let gate = ReadinessGate::new(fast_readiness());
        let retry = fast_retry();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pagination = Pagination::Single;
        let controller =
            PaginationController::new("test", &pagination, &[], false, None, &gate, &retry, &cancel);
        let mut h = harvester();
        let reporter = MockReporter::new();
        let outcome = controller
            .run(&session, "https://s.com/", &mut h, &reporter)
            .await;
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.pages, 0);
        assert!(reporter.events.lock().unwrap().is_empty());
    }

    #[test]
    fn pagination_from_json() {
        let p: Pagination = serde_json::from_str(
            r#"{"kind": "click-to-load", "control": [{"xpath": "//div[contains(text(), 'Mostrar mais')]"}]}"#,
        )
        .unwrap();
        assert_eq!(p.label(), "click-to-load");
        assert!(matches!(p, Pagination::ClickToLoad { max_clicks: 50, .. }));

        let p: Pagination = serde_json::from_str(r#"{"kind": "url-increment", "max_pages": 8}"#).unwrap();
        assert_eq!(
            p,
            Pagination::UrlIncrement {
                param: "page".into(),
                start: 1,
                max_pages: Some(8)
            }
        );
    }
}
