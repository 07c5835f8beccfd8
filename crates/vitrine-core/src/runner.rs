use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::crawl::CrawlService;
use crate::error::CrawlError;
use crate::events::{CrawlEvent, CrawlReporter};
use crate::models::CrawlReport;
use crate::sink::ResultSink;
use crate::target::CrawlTarget;
use crate::traits::SessionProvider;

/// Result of one target in a multi-target run.
#[derive(Debug)]
pub struct TargetOutcome {
    pub name: String,
    pub result: Result<CrawlReport, CrawlError>,
}

/// Runs several targets with bounded concurrency.
///
/// Every target gets its own session, dedup index and sink; a failing
/// target never affects the others. Outcomes come back in input order.
pub struct CrawlRunner<P: SessionProvider> {
    service: CrawlService<P>,
    concurrency: usize,
}

impl<P: SessionProvider> CrawlRunner<P> {
    pub fn new(service: CrawlService<P>, concurrency: usize) -> Self {
        Self {
            service,
            concurrency: concurrency.max(1),
        }
    }

    /// Crawl every target and write its records through the sink built by
    /// `make_sink`. Targets not yet started when `cancel` fires are
    /// skipped; running ones stop at their next page boundary and still
    /// write what they have.
    pub async fn run<K, F, R>(
        &self,
        targets: &[CrawlTarget],
        make_sink: F,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Vec<TargetOutcome>
    where
        K: ResultSink,
        F: Fn(&CrawlTarget) -> Result<K, CrawlError>,
        R: CrawlReporter,
    {
        tracing::info!(
            targets = targets.len(),
            concurrency = self.concurrency,
            "Runner started"
        );

        let make_sink = &make_sink;
        let outcomes: Vec<TargetOutcome> = stream::iter(targets)
            .map(|target| async move {
                let result = if cancel.is_cancelled() {
                    Err(CrawlError::Generic("Cancelled before start".into()))
                } else {
                    match make_sink(target) {
                        Ok(sink) => {
                            self.service
                                .crawl_into(target, &sink, cancel, reporter)
                                .await
                        }
                        Err(e) => Err(e),
                    }
                };

                if let Err(e) = &result {
                    reporter.report(CrawlEvent::TargetFailed {
                        target: &target.name,
                        error: &e.to_string(),
                    });
                }

                TargetOutcome {
                    name: target.name.clone(),
                    result,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        tracing::info!(
            succeeded = outcomes.len() - failed,
            failed,
            cancelled = cancel.is_cancelled(),
            "Runner stopped"
        );

        outcomes
    }
}
