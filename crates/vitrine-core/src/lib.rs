pub mod crawl;
pub mod dedup;
pub mod error;
pub mod events;
pub mod extractor;
pub mod harvest;
pub mod models;
pub mod normalize;
pub mod pagination;
pub mod predicate;
pub mod readiness;
pub mod retry;
pub mod runner;
pub mod settings;
pub mod sink;
pub mod target;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use crawl::CrawlService;
pub use error::{CrawlError, ErrorKind};
pub use events::{CrawlEvent, CrawlReporter, TracingCrawlReporter};
pub use models::{CrawlReport, Price, Record};
pub use pagination::{Pagination, Termination};
pub use runner::{CrawlRunner, TargetOutcome};
pub use settings::EngineSettings;
pub use sink::{CsvSink, ResultSink};
pub use target::{CrawlTarget, TargetResolver};
pub use traits::{Action, BrowserSession, Query, SessionProvider};
