use scraper::Selector;

use crate::dedup::{Deduplicator, KeyPolicy};
use crate::extractor::{RecordExtractor, parse_selector};
use crate::models::{PageSnapshot, PageUrls, Record};
use crate::normalize::{Normalizer, Rejection};

/// What one snapshot contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageHarvest {
    /// Containers located on the page.
    pub containers: usize,
    /// Records newly accepted into the result set.
    pub accepted: usize,
    /// The page carried the "not found" marker; nothing was extracted.
    pub not_found: bool,
}

/// Extraction → normalization → dedup for one target.
///
/// Snapshots are parsed and dropped inside [`Harvester::harvest`], which is
/// synchronous, so no parsed document ever crosses an await point.
#[derive(Debug)]
pub struct Harvester {
    extractor: RecordExtractor,
    normalizer: Normalizer,
    not_found: Option<Selector>,
    dedup: Deduplicator,
    filtered: usize,
    gaps: usize,
}

impl Harvester {
    pub fn new(
        extractor: RecordExtractor,
        normalizer: Normalizer,
        not_found: Option<&str>,
        policy: KeyPolicy,
    ) -> Result<Self, crate::error::CrawlError> {
        Ok(Self {
            extractor,
            normalizer,
            not_found: not_found.map(parse_selector).transpose()?,
            dedup: Deduplicator::new(policy),
            filtered: 0,
            gaps: 0,
        })
    }

    pub fn harvest(&mut self, page: u32, urls: PageUrls, markup: &str) -> PageHarvest {
        let snapshot = PageSnapshot::parse(page, urls, markup);

        if let Some(marker) = &self.not_found {
            if snapshot.document.select(marker).next().is_some() {
                tracing::info!(page, "Not-found marker present");
                return PageHarvest {
                    not_found: true,
                    ..Default::default()
                };
            }
        }

        let extraction = self.extractor.extract(&snapshot);
        self.gaps += extraction.gaps;

        let mut accepted = 0;
        for raw in &extraction.records {
            match self.normalizer.normalize(raw, &snapshot.urls) {
                Ok(record) => {
                    if self.dedup.accept(record) {
                        accepted += 1;
                    }
                }
                Err(Rejection::Filtered) => self.filtered += 1,
                Err(Rejection::Gap(field)) => {
                    tracing::debug!(page, field, "Record missing required field, skipping");
                    self.gaps += 1;
                }
            }
        }

        PageHarvest {
            containers: extraction.containers,
            accepted,
            not_found: false,
        }
    }

    pub fn total(&self) -> usize {
        self.dedup.len()
    }

    pub fn filtered(&self) -> usize {
        self.filtered
    }

    pub fn gaps(&self) -> usize {
        self.gaps
    }

    pub fn into_records(self) -> Vec<Record> {
        self.dedup.into_records()
    }
}
