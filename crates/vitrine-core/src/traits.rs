use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// A query that identifies element(s) within the live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    #[serde(rename = "css")]
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Query {
    /// Substitute the `{page}` placeholder with a page ordinal.
    pub fn with_page(&self, page: u32) -> Query {
        let fill = |s: &str| s.replace("{page}", &page.to_string());
        match self {
            Query::Css(s) => Query::Css(fill(s)),
            Query::XPath(s) => Query::XPath(fill(s)),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Css(s) => write!(f, "css:{s}"),
            Query::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Interactive action performed on a located element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Click,
    ScrollIntoView,
}

/// One live browser page driven by the engine.
///
/// All calls are sequential: the engine never issues overlapping calls on
/// the same session. Implementations map their native failures onto
/// [`CrawlError`] kinds so the retry policy can tell a blocked click from
/// a missing element.
pub trait BrowserSession: Send + Sync {
    /// Opaque handle to a located element.
    type Element: Send + Sync;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), CrawlError>> + Send;

    /// Locate the first element matching `query`. `Ok(None)` means absent.
    fn locate(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Option<Self::Element>, CrawlError>> + Send;

    fn locate_all(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Self::Element>, CrawlError>> + Send;

    fn act(
        &self,
        element: &Self::Element,
        action: Action,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, CrawlError>> + Send;

    /// Fully rendered markup of the current page state.
    fn page_source(&self) -> impl Future<Output = Result<String, CrawlError>> + Send;

    /// Evaluate a script in the page and return its JSON value.
    fn execute_probe(
        &self,
        script: &str,
    ) -> impl Future<Output = Result<serde_json::Value, CrawlError>> + Send;

    /// Release the page. Called exactly once per crawl, on every exit path.
    fn close(&self) -> impl Future<Output = Result<(), CrawlError>> + Send;
}

/// Opens one fresh [`BrowserSession`] per crawl target.
pub trait SessionProvider: Send + Sync {
    type Session: BrowserSession;

    fn open(&self) -> impl Future<Output = Result<Self::Session, CrawlError>> + Send;
}
