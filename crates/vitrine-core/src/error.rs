use thiserror::Error;

/// Coarse classification of a [`CrawlError`], used by the controller to
/// decide between retrying, ending a target, skipping a container or
/// reporting an output failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, stale element, intercepted click. Retried.
    Transient,
    /// Expected markers, containers or controls never appeared. Ends the
    /// current target, not the run.
    ContentAbsent,
    /// One field or one container lacked required data. Skipped.
    ExtractionGap,
    /// Output could not be persisted.
    SinkFailure,
    /// Anything else: session crashed, bad configuration, unsupported action.
    Fatal,
}

/// Engine-wide error types for Vitrine.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// A wait or browser call exceeded its deadline.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// The element reference no longer belongs to the live page.
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// The element exists but could not be interacted with (covered,
    /// off-screen, disabled).
    #[error("Interaction blocked: {0}")]
    Interaction(String),

    /// The element is expected but has not rendered yet.
    #[error("Element not yet present: {0}")]
    NotYetPresent(String),

    /// Network/connection error while loading a page.
    #[error("Network error: {0}")]
    Network(String),

    /// Expected content markers or containers never appeared.
    #[error("Content absent: {0}")]
    ContentAbsent(String),

    /// The pagination control is gone from the page.
    #[error("Control absent: {0}")]
    ControlAbsent(String),

    /// A container or field lacked the data a record needs.
    #[error("Extraction gap: {0}")]
    ExtractionGap(String),

    /// Writing the output file failed.
    #[error("Sink failure: {0}")]
    SinkFailure(String),

    /// The browser session failed in a non-recoverable way.
    #[error("Session error: {0}")]
    Session(String),

    /// The session cannot perform the requested action.
    #[error("Unsupported by this session: {0}")]
    Unsupported(String),

    /// Invalid target configuration (selector, predicate, URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::Timeout(_)
            | CrawlError::StaleElement(_)
            | CrawlError::Interaction(_)
            | CrawlError::NotYetPresent(_)
            | CrawlError::Network(_) => ErrorKind::Transient,
            CrawlError::ContentAbsent(_) | CrawlError::ControlAbsent(_) => {
                ErrorKind::ContentAbsent
            }
            CrawlError::ExtractionGap(_) => ErrorKind::ExtractionGap,
            CrawlError::SinkFailure(_) => ErrorKind::SinkFailure,
            CrawlError::Session(_)
            | CrawlError::Unsupported(_)
            | CrawlError::Config(_)
            | CrawlError::Serialization(_)
            | CrawlError::Generic(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<csv::Error> for CrawlError {
    fn from(e: csv::Error) -> Self {
        CrawlError::SinkFailure(e.to_string())
    }
}
