//! Text cleanup, price assembly and URL resolution.
//!
//! Everything here is a pure function of its inputs; the same raw record
//! against the same page URLs always produces the same [`Record`].

use url::Url;

use crate::error::CrawlError;
use crate::models::{Field, PageUrls, Price, RawRecord, Record};
use crate::predicate::CompiledPredicate;

/// Currency markers stripped from price parts, longest first.
const CURRENCY_MARKERS: &[&str] = &["US$", "R$", "$", "€", "£", "¥"];

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison form of a text: whitespace-collapsed and lowercased.
pub fn fold(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

fn clean_price_part(part: &str) -> Option<String> {
    let mut cleaned: String = part.chars().filter(|c| !c.is_whitespace()).collect();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Join integer, decimal and fraction parts in that order.
///
/// All three must be present after symbol and whitespace stripping,
/// otherwise the price is unavailable.
pub fn concat_price(integer: Option<&str>, decimal: Option<&str>, fraction: Option<&str>) -> Price {
    match (
        integer.and_then(clean_price_part),
        decimal.and_then(clean_price_part),
        fraction.and_then(clean_price_part),
    ) {
        (Some(i), Some(d), Some(f)) => Price::Amount(format!("{i}{d}{f}")),
        _ => Price::Unavailable,
    }
}

/// Resolve an extracted href to an absolute URL.
///
/// Absolute hrefs are returned unchanged. Root-relative hrefs resolve
/// against the site root, path-relative ones against the current page.
pub fn resolve_url(href: &str, urls: &PageUrls) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    let base = if href.starts_with('/') {
        &urls.site_root
    } else {
        &urls.current
    };
    base.join(href).ok().map(String::from)
}

/// Scheme + host (+ port) root of a URL.
pub fn site_root(url: &Url) -> Result<Url, CrawlError> {
    let host = url
        .host_str()
        .ok_or_else(|| CrawlError::Config(format!("URL has no host: {url}")))?;
    let root = match url.port() {
        Some(port) => format!("{}://{host}:{port}/", url.scheme()),
        None => format!("{}://{host}/", url.scheme()),
    };
    Url::parse(&root).map_err(|e| CrawlError::Config(format!("Invalid site root {root}: {e}")))
}

/// Why a raw record did not become a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Missing description or link.
    Gap(&'static str),
    /// The inclusion predicate said no.
    Filtered,
}

/// Turns raw records into records and applies the target's inclusion
/// predicate.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    category: Option<String>,
    predicate: Option<CompiledPredicate>,
}

impl Normalizer {
    pub fn new(category: Option<String>, predicate: Option<CompiledPredicate>) -> Self {
        Self {
            category: category.map(|c| collapse_whitespace(&c)),
            predicate,
        }
    }

    pub fn normalize(&self, raw: &RawRecord, urls: &PageUrls) -> Result<Record, Rejection> {
        let description = raw
            .get(Field::Description)
            .map(collapse_whitespace)
            .filter(|d| !d.is_empty())
            .ok_or(Rejection::Gap("description"))?;

        let url = raw
            .get(Field::Link)
            .and_then(|href| resolve_url(href, urls))
            .or_else(|| raw.href.as_deref().and_then(|href| resolve_url(href, urls)))
            .ok_or(Rejection::Gap("link"))?;

        let price = concat_price(
            raw.get(Field::PriceInteger),
            raw.get(Field::PriceDecimal),
            raw.get(Field::PriceFraction),
        );

        let record = Record {
            description,
            price,
            url,
            category: self.category.clone(),
        };

        match &self.predicate {
            Some(predicate) if !predicate.accepts(&record) => Err(Rejection::Filtered),
            _ => Ok(record),
        }
    }
}
