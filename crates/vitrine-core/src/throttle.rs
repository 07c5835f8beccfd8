//! Per-domain navigation throttling.
//!
//! [`ThrottledProvider`] wraps any [`SessionProvider`]; every session it
//! opens shares one per-domain clock, so concurrent targets on the same
//! host still space out their page loads. Only `navigate` is throttled:
//! clicks and probes act on an already loaded page.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::CrawlError;
use crate::traits::{Action, BrowserSession, Query, SessionProvider};

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum delay between navigations to the same domain.
    pub delay: Duration,
    /// Upper bound of random extra delay, uniform in `[0, jitter)`.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(clock_noise() % jitter_ms)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
        }
    }
}

type DomainClock = Arc<Mutex<HashMap<String, Instant>>>;

/// Provider whose sessions wait between navigations to one domain.
#[derive(Clone)]
pub struct ThrottledProvider<P> {
    inner: P,
    config: ThrottleConfig,
    clock: DomainClock,
}

impl<P: SessionProvider> ThrottledProvider<P> {
    pub fn new(inner: P, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            clock: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<P: SessionProvider> SessionProvider for ThrottledProvider<P> {
    type Session = ThrottledSession<P::Session>;

    async fn open(&self) -> Result<Self::Session, CrawlError> {
        let inner = self.inner.open().await?;
        Ok(ThrottledSession {
            inner,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        })
    }
}

/// A [`BrowserSession`] that delays `navigate` per domain.
pub struct ThrottledSession<S> {
    inner: S,
    config: ThrottleConfig,
    clock: DomainClock,
}

impl<S: BrowserSession> ThrottledSession<S> {
    pub fn new(inner: S, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            clock: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Sleep until this domain's delay has elapsed, then stamp it.
    async fn wait_for_domain(&self, domain: &str) {
        let wait = {
            let mut clock = self.clock.lock().await;
            let now = Instant::now();
            let wait = clock
                .get(domain)
                .map(|last| (*last + self.config.next_delay()).saturating_duration_since(now))
                .unwrap_or_default();
            // Stamp the slot now so a concurrent navigation queues behind it.
            clock.insert(domain.to_string(), now + wait);
            wait
        };

        if !wait.is_zero() {
            tracing::debug!(%domain, sleep_ms = %wait.as_millis(), "Throttling navigation");
            tokio::time::sleep(wait).await;
        }
    }
}

/// `scheme://host:port`, the unit throttling is applied to.
fn domain_key(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}://{host}:{port}", url.scheme()))
}

impl<S: BrowserSession> BrowserSession for ThrottledSession<S> {
    type Element = S::Element;

    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        if let Some(domain) = domain_key(url) {
            self.wait_for_domain(&domain).await;
        }
        self.inner.navigate(url).await
    }

    async fn locate(&self, query: &Query) -> Result<Option<Self::Element>, CrawlError> {
        self.inner.locate(query).await
    }

    async fn locate_all(&self, query: &Query) -> Result<Vec<Self::Element>, CrawlError> {
        self.inner.locate_all(query).await
    }

    async fn act(&self, element: &Self::Element, action: Action) -> Result<(), CrawlError> {
        self.inner.act(element, action).await
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        self.inner.current_url().await
    }

    async fn page_source(&self) -> Result<String, CrawlError> {
        self.inner.page_source().await
    }

    async fn execute_probe(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        self.inner.execute_probe(script).await
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.inner.close().await
    }
}

// xorshift64 over the clock's nanoseconds; jitter only, not randomness
// anyone depends on.
fn clock_noise() -> u64 {
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64
        | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}
