//! Waiting for a page to reach an extractable state.
//!
//! Two modes:
//!
//! - **Presence**: poll until one of the marker elements is locatable, up
//!   to a timeout. A timeout is reported, not raised.
//! - **Stability**: measure a monotonic page-size metric after each
//!   (optional) scroll; the page is stable once the metric stops changing
//!   for `stable_probes` consecutive probes. The probe count is capped and
//!   exhausting it yields a best-effort verdict.

use std::time::Duration;

use tokio::time::Instant;

use crate::traits::{BrowserSession, Query};

/// Timing and probe settings for the readiness gate.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Longest wait for a presence marker.
    pub presence_timeout: Duration,
    /// Delay between presence polls.
    pub poll_interval: Duration,
    /// Delay between an advance action and the next size probe.
    pub settle_delay: Duration,
    /// Consecutive unchanged probes that count as stable.
    pub stable_probes: u32,
    /// Hard cap on size probes per stability wait.
    pub max_probes: u32,
    /// Script returning the size metric.
    pub size_probe: String,
    /// Script that advances the page (scroll) before a probe.
    pub advance_script: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            settle_delay: Duration::from_secs(1),
            stable_probes: 2,
            max_probes: 20,
            size_probe: "document.body.scrollHeight".into(),
            advance_script: "window.scrollBy(0, 500)".into(),
        }
    }
}

/// Verdict of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Stability was never reached within the probe cap; proceed anyway.
    BestEffort,
    /// No presence marker appeared before the timeout.
    TimedOut,
}

#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Block until any marker is locatable or the timeout elapses.
    ///
    /// With no markers the page is considered ready immediately.
    pub async fn await_presence<S: BrowserSession>(
        &self,
        session: &S,
        markers: &[Query],
    ) -> Readiness {
        if markers.is_empty() {
            return Readiness::Ready;
        }

        let deadline = Instant::now() + self.config.presence_timeout;
        loop {
            for marker in markers {
                match session.locate(marker).await {
                    Ok(Some(_)) => {
                        tracing::debug!(%marker, "Presence marker found");
                        return Readiness::Ready;
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!(%marker, error = %e, "Presence probe failed"),
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = %self.config.presence_timeout.as_millis(),
                    "No presence marker appeared before timeout"
                );
                return Readiness::TimedOut;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Probe the size metric until it stops changing.
    ///
    /// With `advance` set, the advance script runs before every probe;
    /// that is how scroll-triggered content gets loaded.
    pub async fn await_stable<S: BrowserSession>(&self, session: &S, advance: bool) -> Readiness {
        let mut last = self.measure(session).await;
        let mut unchanged = 0;

        for probe in 1..=self.config.max_probes {
            if advance {
                if let Err(e) = session.execute_probe(&self.config.advance_script).await {
                    tracing::debug!(probe, error = %e, "Advance script failed");
                }
            }
            tokio::time::sleep(self.config.settle_delay).await;

            let current = self.measure(session).await;
            if current.is_some() && current == last {
                unchanged += 1;
                if unchanged >= self.config.stable_probes {
                    tracing::debug!(probe, size = ?current, "Page size stable");
                    return Readiness::Ready;
                }
            } else {
                unchanged = 0;
            }
            last = current;
        }

        tracing::info!(
            max_probes = self.config.max_probes,
            "Page size never stabilised, proceeding best-effort"
        );
        Readiness::BestEffort
    }

    async fn measure<S: BrowserSession>(&self, session: &S) -> Option<f64> {
        match session.execute_probe(&self.config.size_probe).await {
            Ok(value) => value.as_f64(),
            Err(e) => {
                tracing::debug!(error = %e, "Size probe failed");
                None
            }
        }
    }
}
