//! Locator-driven record extraction from a parsed page snapshot.
//!
//! Site markup differences are expressed as ordered lists of locator
//! alternatives, one list per [`Field`]. The extractor walks the list and
//! keeps the first alternative that yields a non-empty value; a field for
//! which every alternative fails is simply absent.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::models::{Field, PageSnapshot, RawRecord};

fn default_depth() -> usize {
    5
}

/// Where to find one field, relative to its container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Locator {
    /// First descendant matching a CSS selector.
    Css {
        selector: String,
        #[serde(default)]
        attr: Option<String>,
    },
    /// The container element itself.
    #[serde(rename = "self")]
    SelfNode {
        #[serde(default)]
        attr: Option<String>,
    },
    /// Nearest ancestor matching a CSS selector.
    Ancestor {
        selector: String,
        #[serde(default)]
        attr: Option<String>,
        #[serde(default = "default_depth")]
        max_depth: usize,
    },
    /// Climb from the container through its parents and take the first
    /// descendant match found at any level.
    Nearby {
        selector: String,
        #[serde(default)]
        attr: Option<String>,
        #[serde(default = "default_depth")]
        max_depth: usize,
    },
    /// Any descendant whose class attribute contains one of the keywords.
    ClassKeyword {
        keywords: Vec<String>,
        #[serde(default)]
        attr: Option<String>,
    },
}

/// How candidate containers are found in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContainerLocator {
    Css { selector: String },
    ClassKeyword { keywords: Vec<String> },
}

/// Container alternatives plus per-field locator alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorMap {
    pub containers: Vec<ContainerLocator>,
    #[serde(default)]
    pub fields: BTreeMap<Field, Vec<Locator>>,
}

#[derive(Debug, Clone)]
enum Probe {
    Css(Selector),
    SelfNode,
    Ancestor(Selector, usize),
    Nearby(Selector, usize),
    ClassKeyword(Vec<String>),
}

#[derive(Debug, Clone)]
struct CompiledLocator {
    probe: Probe,
    attr: Option<String>,
}

#[derive(Debug, Clone)]
enum CompiledContainer {
    Css(Selector),
    ClassKeyword(Vec<String>),
}

/// Output of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Containers located on the page, usable or not.
    pub containers: usize,
    pub records: Vec<RawRecord>,
    /// Containers skipped because no field could be read.
    pub gaps: usize,
}

/// Pulls [`RawRecord`]s out of a snapshot using a compiled [`LocatorMap`].
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    containers: Vec<CompiledContainer>,
    fields: Vec<(Field, Vec<CompiledLocator>)>,
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector)
        .map_err(|e| CrawlError::Config(format!("Invalid selector '{selector}': {e:?}")))
}

fn lowered(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

impl RecordExtractor {
    /// Compile every selector up front so a bad target fails before any
    /// page is loaded.
    pub fn new(map: &LocatorMap) -> Result<Self, CrawlError> {
        if map.containers.is_empty() {
            return Err(CrawlError::Config(
                "At least one container locator is required".into(),
            ));
        }

        let containers = map
            .containers
            .iter()
            .map(|c| match c {
                ContainerLocator::Css { selector } => {
                    parse_selector(selector).map(CompiledContainer::Css)
                }
                ContainerLocator::ClassKeyword { keywords } => {
                    Ok(CompiledContainer::ClassKeyword(lowered(keywords)))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = Vec::with_capacity(map.fields.len());
        for (field, alternatives) in &map.fields {
            let compiled = alternatives
                .iter()
                .map(Self::compile)
                .collect::<Result<Vec<_>, _>>()?;
            fields.push((*field, compiled));
        }

        Ok(Self { containers, fields })
    }

    fn compile(locator: &Locator) -> Result<CompiledLocator, CrawlError> {
        let (probe, attr) = match locator {
            Locator::Css { selector, attr } => (Probe::Css(parse_selector(selector)?), attr),
            Locator::SelfNode { attr } => (Probe::SelfNode, attr),
            Locator::Ancestor {
                selector,
                attr,
                max_depth,
            } => (Probe::Ancestor(parse_selector(selector)?, *max_depth), attr),
            Locator::Nearby {
                selector,
                attr,
                max_depth,
            } => (Probe::Nearby(parse_selector(selector)?, *max_depth), attr),
            Locator::ClassKeyword { keywords, attr } => {
                (Probe::ClassKeyword(lowered(keywords)), attr)
            }
        };
        Ok(CompiledLocator {
            probe,
            attr: attr.clone(),
        })
    }

    /// Extract raw records from every container on the page.
    ///
    /// Never fails: a container yielding nothing is counted as a gap and
    /// skipped.
    pub fn extract(&self, snapshot: &PageSnapshot) -> Extraction {
        let containers = self.locate_containers(&snapshot.document);
        let mut extraction = Extraction {
            containers: containers.len(),
            ..Default::default()
        };

        for (index, container) in containers.into_iter().enumerate() {
            let raw = self.extract_container(container);
            if raw.is_empty() {
                tracing::debug!(
                    page = snapshot.page,
                    index,
                    "Container yielded no fields, skipping"
                );
                extraction.gaps += 1;
            } else {
                extraction.records.push(raw);
            }
        }

        extraction
    }

    fn locate_containers<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for alternative in &self.containers {
            let found: Vec<ElementRef<'a>> = match alternative {
                CompiledContainer::Css(selector) => document.select(selector).collect(),
                CompiledContainer::ClassKeyword(keywords) => {
                    class_keyword_matches(document.root_element(), keywords, true).collect()
                }
            };
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    fn extract_container(&self, container: ElementRef<'_>) -> RawRecord {
        let mut raw = RawRecord {
            href: container
                .value()
                .attr("href")
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            ..Default::default()
        };

        for (field, alternatives) in &self.fields {
            if let Some(value) = alternatives.iter().find_map(|loc| locate_value(container, loc)) {
                raw.fields.insert(*field, value);
            }
        }

        raw
    }
}

fn locate_value(container: ElementRef<'_>, locator: &CompiledLocator) -> Option<String> {
    let attr = locator.attr.as_deref();
    match &locator.probe {
        Probe::Css(selector) => container
            .select(selector)
            .find_map(|el| value_of(el, attr)),
        Probe::SelfNode => value_of(container, attr),
        Probe::Ancestor(selector, max_depth) => container
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(*max_depth)
            .find(|a| selector.matches(a))
            .and_then(|a| value_of(a, attr)),
        Probe::Nearby(selector, max_depth) => std::iter::once(container)
            .chain(container.ancestors().filter_map(ElementRef::wrap))
            .take(max_depth + 1)
            .find_map(|level| level.select(selector).next())
            .and_then(|el| value_of(el, attr)),
        Probe::ClassKeyword(keywords) => {
            class_keyword_matches(container, keywords, false).find_map(|el| value_of(el, attr))
        }
    }
}

/// Elements under `root` whose class attribute contains any keyword.
fn class_keyword_matches<'a, 'k>(
    root: ElementRef<'a>,
    keywords: &'k [String],
    include_root: bool,
) -> impl Iterator<Item = ElementRef<'a>> + 'k
where
    'a: 'k,
{
    root.descendants()
        .skip(usize::from(!include_root))
        .filter_map(ElementRef::wrap)
        .filter(move |el| {
            el.value().attr("class").is_some_and(|class| {
                let class = class.to_lowercase();
                keywords.iter().any(|k| class.contains(k.as_str()))
            })
        })
}

fn value_of(element: ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    let value = match attr {
        Some(name) => element.value().attr(name)?.trim().to_string(),
        None => element
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    };
    (!value.is_empty()).then_some(value)
}
