use crate::pagination::SourceOutcome;

/// Progress events emitted while crawling, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    TargetStarted {
        target: &'a str,
        sources: usize,
    },
    SourceStarted {
        target: &'a str,
        url: &'a str,
    },
    PageExtracted {
        target: &'a str,
        page: u32,
        containers: usize,
        accepted: usize,
        total: usize,
    },
    SourceFinished {
        target: &'a str,
        outcome: &'a SourceOutcome,
    },
    /// Fewer records than the target's expected minimum.
    BelowExpected {
        target: &'a str,
        records: usize,
        expected: usize,
    },
    TargetFinished {
        target: &'a str,
        records: usize,
        filtered: usize,
        gaps: usize,
        elapsed_ms: i64,
    },
    TargetFailed {
        target: &'a str,
        error: &'a str,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::TargetStarted { target, sources } => {
                tracing::info!(site = %target, sources, "Crawl started");
            }
            CrawlEvent::SourceStarted { target, url } => {
                tracing::info!(site = %target, %url, "Loading source");
            }
            CrawlEvent::PageExtracted {
                target,
                page,
                containers,
                accepted,
                total,
            } => {
                tracing::info!(site = %target, page, containers, accepted, total, "Page extracted");
            }
            CrawlEvent::SourceFinished { target, outcome } => {
                tracing::info!(
                    site = %target,
                    url = %outcome.url,
                    pages = outcome.pages,
                    termination = %outcome.termination,
                    best_effort = outcome.best_effort,
                    "Source finished"
                );
            }
            CrawlEvent::BelowExpected {
                target,
                records,
                expected,
            } => {
                tracing::warn!(
                    site = %target,
                    records,
                    expected,
                    "Fewer records than expected, the page may not have loaded fully"
                );
            }
            CrawlEvent::TargetFinished {
                target,
                records,
                filtered,
                gaps,
                elapsed_ms,
            } => {
                tracing::info!(
                    site = %target,
                    records,
                    filtered,
                    gaps,
                    elapsed_ms,
                    "Crawl finished"
                );
            }
            CrawlEvent::TargetFailed { target, error } => {
                tracing::error!(site = %target, %error, "Crawl failed");
            }
        }
    }
}
