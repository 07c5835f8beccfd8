use std::path::PathBuf;
use std::time::Duration;

use crate::error::CrawlError;
use crate::readiness::ReadinessConfig;
use crate::retry::RetryPolicy;
use crate::throttle::ThrottleConfig;

/// Engine tuning shared by every target of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub targets_dir: PathBuf,
    /// Targets crawled at once, one browser page each.
    pub concurrency: usize,
    pub presence_timeout: Duration,
    pub settle_delay: Duration,
    pub max_probes: u32,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Per-domain delay between navigations; zero disables throttling.
    pub throttle_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let readiness = ReadinessConfig::default();
        let retry = RetryPolicy::default();
        Self {
            targets_dir: PathBuf::from("targets"),
            concurrency: 1,
            presence_timeout: readiness.presence_timeout,
            settle_delay: readiness.settle_delay,
            max_probes: readiness.max_probes,
            max_retries: retry.max_retries,
            retry_backoff: retry.backoff,
            throttle_delay: Duration::ZERO,
        }
    }
}

impl EngineSettings {
    /// Read `VITRINE_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, CrawlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CrawlError> {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration, CrawlError> {
            Ok(parse_var(&lookup, key, 0)?
                .map(Duration::from_millis)
                .unwrap_or(default))
        };

        Ok(Self {
            targets_dir: lookup("VITRINE_TARGETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.targets_dir),
            concurrency: parse_var(&lookup, "VITRINE_CONCURRENCY", 1)?
                .map(|n| narrow("VITRINE_CONCURRENCY", n))
                .transpose()?
                .unwrap_or(defaults.concurrency),
            presence_timeout: millis("VITRINE_PRESENCE_TIMEOUT_MS", defaults.presence_timeout)?,
            settle_delay: millis("VITRINE_SETTLE_DELAY_MS", defaults.settle_delay)?,
            max_probes: parse_var(&lookup, "VITRINE_MAX_PROBES", 1)?
                .map(|n| narrow("VITRINE_MAX_PROBES", n))
                .transpose()?
                .unwrap_or(defaults.max_probes),
            max_retries: parse_var(&lookup, "VITRINE_MAX_RETRIES", 0)?
                .map(|n| narrow("VITRINE_MAX_RETRIES", n))
                .transpose()?
                .unwrap_or(defaults.max_retries),
            retry_backoff: millis("VITRINE_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            throttle_delay: millis("VITRINE_THROTTLE_MS", defaults.throttle_delay)?,
        })
    }

    pub fn readiness(&self) -> ReadinessConfig {
        ReadinessConfig {
            presence_timeout: self.presence_timeout,
            settle_delay: self.settle_delay,
            max_probes: self.max_probes,
            ..ReadinessConfig::default()
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
    }

    pub fn throttle(&self) -> Option<ThrottleConfig> {
        (!self.throttle_delay.is_zero()).then(|| ThrottleConfig::new(self.throttle_delay))
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    min: u64,
) -> Result<Option<u64>, CrawlError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        CrawlError::Config(format!(
            "Invalid {key} '{raw}': must be a non-negative integer"
        ))
    })?;
    if parsed < min {
        return Err(CrawlError::Config(format!("{key} must be at least {min}")));
    }
    Ok(Some(parsed))
}

fn narrow<T: TryFrom<u64>>(key: &str, value: u64) -> Result<T, CrawlError> {
    T::try_from(value).map_err(|_| CrawlError::Config(format!("{key} is too large: {value}")))
}
