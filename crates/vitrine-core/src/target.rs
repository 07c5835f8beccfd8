//! Crawl target configuration and preset resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dedup::KeyPolicy;
use crate::error::CrawlError;
use crate::extractor::{LocatorMap, RecordExtractor, parse_selector};
use crate::harvest::Harvester;
use crate::normalize::{Normalizer, site_root};
use crate::pagination::Pagination;
use crate::predicate::Predicate;
use crate::sink::{CsvSink, Schema};
use crate::traits::Query;

/// Where and how a target's records are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub columns: Schema,
    /// Single ASCII character; `,` when absent.
    #[serde(default)]
    pub delimiter: Option<char>,
}

/// Everything the engine needs to crawl one site. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub name: String,
    /// Start URLs, crawled in order through one session. Records from all
    /// of them share one dedup index.
    pub urls: Vec<String>,
    /// Base for root-relative links. Derived from the first URL if absent.
    #[serde(default)]
    pub site_root: Option<String>,
    pub pagination: Pagination,
    /// Presence markers; the page is ready once any of them is locatable.
    #[serde(default)]
    pub ready: Vec<Query>,
    /// CSS marker of an empty result page.
    #[serde(default)]
    pub not_found: Option<String>,
    pub locators: LocatorMap,
    #[serde(default)]
    pub predicate: Option<Predicate>,
    /// Fixed category attached to every record.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub dedup: KeyPolicy,
    /// Scroll until stable after every load, for lazily rendered tiles.
    #[serde(default)]
    pub prescroll: bool,
    /// Warn when a crawl yields fewer records than this.
    #[serde(default)]
    pub expected_min_records: Option<usize>,
    pub output: OutputSpec,
}

impl CrawlTarget {
    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CrawlError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CrawlError::Config(format!("Failed to read target file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            CrawlError::Config(format!("Invalid target file {}: {e}", path.display()))
        })
    }

    /// Fail fast on anything that would only surface mid-crawl: bad URLs,
    /// selectors, predicate patterns, delimiter.
    pub fn check(&self) -> Result<(), CrawlError> {
        if self.name.trim().is_empty() {
            return Err(CrawlError::Config("Target name must not be empty".into()));
        }
        if self.urls.is_empty() {
            return Err(CrawlError::Config(format!(
                "Target {} has no start URLs",
                self.name
            )));
        }
        for url in &self.urls {
            Url::parse(&url.replace("{page}", "1"))
                .map_err(|e| CrawlError::Config(format!("Invalid start URL {url}: {e}")))?;
        }
        self.site_root()?;
        self.delimiter()?;
        if self.output.columns.0.is_empty() {
            return Err(CrawlError::Config(format!(
                "Target {} has no output columns",
                self.name
            )));
        }

        let controls: &[Query] = match &self.pagination {
            Pagination::ClickToLoad { control, .. } | Pagination::ClickNext { control, .. } => {
                if control.is_empty() {
                    return Err(CrawlError::Config(format!(
                        "Target {}: {} needs at least one control query",
                        self.name,
                        self.pagination.label()
                    )));
                }
                control
            }
            _ => &[],
        };
        for query in self.ready.iter().chain(controls) {
            if let Query::Css(selector) = query.with_page(1) {
                parse_selector(&selector)?;
            }
        }

        self.harvester().map(|_| ())
    }

    /// Explicit site root, or the scheme and host of the first start URL.
    pub fn site_root(&self) -> Result<Url, CrawlError> {
        if let Some(root) = &self.site_root {
            return Url::parse(root)
                .map_err(|e| CrawlError::Config(format!("Invalid site root {root}: {e}")));
        }
        let first = self
            .urls
            .first()
            .ok_or_else(|| CrawlError::Config(format!("Target {} has no start URLs", self.name)))?;
        let url = Url::parse(&first.replace("{page}", "1"))
            .map_err(|e| CrawlError::Config(format!("Invalid start URL {first}: {e}")))?;
        site_root(&url)
    }

    /// Fresh extraction pipeline with an empty dedup index.
    pub fn harvester(&self) -> Result<Harvester, CrawlError> {
        let extractor = RecordExtractor::new(&self.locators)?;
        let predicate = self.predicate.as_ref().map(Predicate::compile).transpose()?;
        Harvester::new(
            extractor,
            Normalizer::new(self.category.clone(), predicate),
            self.not_found.as_deref(),
            self.dedup,
        )
    }

    pub fn sink(&self) -> Result<CsvSink, CrawlError> {
        Ok(CsvSink::new(&self.output.path).with_delimiter(self.delimiter()?))
    }

    /// Presence markers plus the not-found marker: an empty result page is
    /// a loaded page too.
    pub fn presence_markers(&self) -> Vec<Query> {
        let mut markers = self.ready.clone();
        if let Some(not_found) = &self.not_found {
            if !markers.is_empty() {
                markers.push(Query::Css(not_found.clone()));
            }
        }
        markers
    }

    /// Redirect output, e.g. from a command-line override.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.path = path.into();
        self
    }

    fn delimiter(&self) -> Result<u8, CrawlError> {
        match self.output.delimiter {
            None => Ok(b','),
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(c) => Err(CrawlError::Config(format!(
                "Delimiter must be a single ASCII character, got {c:?}"
            ))),
        }
    }
}

/// A loaded target and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub target: CrawlTarget,
}

/// Resolves target references (file paths or preset names) to loaded
/// targets.
pub struct TargetResolver {
    targets_dir: PathBuf,
}

impl TargetResolver {
    pub fn new(targets_dir: impl Into<PathBuf>) -> Self {
        Self {
            targets_dir: targets_dir.into(),
        }
    }

    /// Resolve a reference to a [`ResolvedTarget`].
    ///
    /// Accepts:
    /// - A direct file path (e.g. `targets/zonasul.json`)
    /// - A preset name (e.g. `zonasul`), looked up as `{targets_dir}/zonasul.json`
    pub fn resolve(&self, reference: &str) -> Result<ResolvedTarget, CrawlError> {
        let path = self.resolve_path(reference)?;
        let target = CrawlTarget::from_file(&path)?;
        Ok(ResolvedTarget { path, target })
    }

    fn resolve_path(&self, reference: &str) -> Result<PathBuf, CrawlError> {
        let direct = PathBuf::from(reference);
        if direct.is_file() {
            return Ok(direct);
        }

        if reference.is_empty() || reference.contains(['/', '\\']) || reference.ends_with(".json")
        {
            return Err(CrawlError::Config(format!("Target not found: {reference}")));
        }

        let preset = self.targets_dir.join(format!("{reference}.json"));
        if !preset.is_file() {
            return Err(CrawlError::Config(format!(
                "Target not found: {reference} (looked for {})",
                preset.display()
            )));
        }
        Ok(preset)
    }

    /// Preset names available in the targets directory, sorted.
    pub fn presets(&self) -> Result<Vec<String>, CrawlError> {
        let entries = std::fs::read_dir(&self.targets_dir).map_err(|e| {
            CrawlError::Config(format!(
                "Failed to read targets directory {}: {e}",
                self.targets_dir.display()
            ))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem()?.to_str().map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}
