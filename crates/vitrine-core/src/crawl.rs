use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::CrawlError;
use crate::events::{CrawlEvent, CrawlReporter};
use crate::models::CrawlReport;
use crate::pagination::{PaginationController, Termination};
use crate::readiness::ReadinessGate;
use crate::retry::RetryPolicy;
use crate::sink::ResultSink;
use crate::target::CrawlTarget;
use crate::traits::{BrowserSession, SessionProvider};

/// Orchestrates one target: open session → paginate every start URL →
/// close session → report.
///
/// Generic over the session provider, so tests run against scripted
/// pages and production against a real browser.
pub struct CrawlService<P: SessionProvider> {
    provider: P,
    gate: ReadinessGate,
    retry: RetryPolicy,
}

impl<P: SessionProvider> CrawlService<P> {
    pub fn new(provider: P, gate: ReadinessGate, retry: RetryPolicy) -> Self {
        Self {
            provider,
            gate,
            retry,
        }
    }

    /// Crawl a target and return its ordered, deduplicated records.
    ///
    /// Only configuration errors and a failure to open the session are
    /// returned as `Err`. Everything that goes wrong mid-crawl ends the
    /// affected start URL and is recorded in the report; the records
    /// gathered so far are kept.
    pub async fn crawl<R: CrawlReporter>(
        &self,
        target: &CrawlTarget,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CrawlReport, CrawlError> {
        let mut harvester = target.harvester()?;
        let site_root = target.site_root()?;
        let markers = target.presence_markers();

        let started_at = Utc::now();
        reporter.report(CrawlEvent::TargetStarted {
            target: &target.name,
            sources: target.urls.len(),
        });

        let session = self.provider.open().await?;

        let controller = PaginationController::new(
            &target.name,
            &target.pagination,
            &markers,
            target.prescroll,
            Some(&site_root),
            &self.gate,
            &self.retry,
            cancel,
        );

        let mut sources = Vec::with_capacity(target.urls.len());
        for url in &target.urls {
            if cancel.is_cancelled() {
                break;
            }
            reporter.report(CrawlEvent::SourceStarted {
                target: &target.name,
                url,
            });
            let outcome = controller
                .run(&session, url, &mut harvester, reporter)
                .await;
            reporter.report(CrawlEvent::SourceFinished {
                target: &target.name,
                outcome: &outcome,
            });
            let cancelled = outcome.termination == Termination::Cancelled;
            sources.push(outcome);
            if cancelled {
                break;
            }
        }

        if let Err(e) = session.close().await {
            tracing::warn!(site = %target.name, error = %e, "Failed to close session");
        }

        let filtered = harvester.filtered();
        let gaps = harvester.gaps();
        let records = harvester.into_records();

        if let Some(expected) = target.expected_min_records {
            if records.len() < expected {
                reporter.report(CrawlEvent::BelowExpected {
                    target: &target.name,
                    records: records.len(),
                    expected,
                });
            }
        }

        let report = CrawlReport {
            target: target.name.clone(),
            records,
            sources,
            filtered,
            gaps,
            started_at,
            finished_at: Utc::now(),
        };

        reporter.report(CrawlEvent::TargetFinished {
            target: &target.name,
            records: report.records.len(),
            filtered,
            gaps,
            elapsed_ms: report.elapsed().num_milliseconds(),
        });

        Ok(report)
    }

    /// Crawl, then hand the records to `sink`, even if the crawl was cut
    /// short.
    pub async fn crawl_into<K: ResultSink, R: CrawlReporter>(
        &self,
        target: &CrawlTarget,
        sink: &K,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CrawlReport, CrawlError> {
        let report = self.crawl(target, cancel, reporter).await?;
        sink.write(&report.records, &target.output.columns)?;
        Ok(report)
    }
}
