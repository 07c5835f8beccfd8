use std::collections::BTreeMap;
use std::fmt;

use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

/// Placeholder written in place of a price that could not be assembled.
pub const PRICE_UNAVAILABLE: &str = "N/A";

/// Named slot a locator list fills in a [`RawRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Description,
    Link,
    PriceInteger,
    PriceDecimal,
    PriceFraction,
}

/// Raw field texts pulled out of one container, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: BTreeMap<Field, String>,
    /// The container's own `href`, when the container is a link.
    pub href: Option<String>,
}

impl RawRecord {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.href.is_none()
    }
}

/// Price of a record: the concatenated sub-parts, or unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Price {
    Amount(String),
    Unavailable,
}

impl Price {
    pub fn amount(&self) -> Option<&str> {
        match self {
            Price::Amount(a) => Some(a),
            Price::Unavailable => None,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(a) => f.write_str(a),
            Price::Unavailable => f.write_str(PRICE_UNAVAILABLE),
        }
    }
}

/// A normalized catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub description: String,
    pub price: Price,
    /// Absolute product URL; also the dedup key source.
    pub url: String,
    pub category: Option<String>,
}

/// URLs a snapshot's relative links resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrls {
    /// Scheme + host, for root-relative links.
    pub site_root: Url,
    /// The page URL itself, for path-relative links.
    pub current: Url,
}

/// One loaded page state, parsed and ready for extraction.
///
/// `Html` is not `Send`, so a snapshot is built and consumed synchronously
/// and never lives across an await point.
pub struct PageSnapshot {
    pub page: u32,
    pub urls: PageUrls,
    pub document: Html,
}

impl PageSnapshot {
    pub fn parse(page: u32, urls: PageUrls, markup: &str) -> Self {
        Self {
            page,
            urls,
            document: Html::parse_document(markup),
        }
    }
}

/// Final report of one crawled target.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub target: String,
    pub records: Vec<Record>,
    /// One outcome per start URL, in crawl order.
    pub sources: Vec<crate::pagination::SourceOutcome>,
    /// Records rejected by the inclusion predicate.
    pub filtered: usize,
    /// Containers skipped for missing data.
    pub gaps: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl CrawlReport {
    pub fn pages(&self) -> u32 {
        self.sources.iter().map(|s| s.pages).sum()
    }

    /// True when some readiness check ran out of probes and the engine
    /// extracted anyway.
    pub fn best_effort(&self) -> bool {
        self.sources.iter().any(|s| s.best_effort)
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_sentinel_display() {
        assert_eq!(Price::Unavailable.to_string(), "N/A");
        assert_eq!(Price::Amount("12,90".into()).to_string(), "12,90");
        assert_eq!(Price::Unavailable.amount(), None);
    }

    #[test]
    fn raw_record_emptiness() {
        let mut raw = RawRecord::default();
        assert!(raw.is_empty());
        raw.href = Some("/p/1".into());
        assert!(!raw.is_empty());
        assert_eq!(raw.get(Field::Description), None);
    }
}
