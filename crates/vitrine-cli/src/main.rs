use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vitrine_client::HttpProvider;
use vitrine_core::crawl::CrawlService;
use vitrine_core::readiness::ReadinessGate;
use vitrine_core::runner::{CrawlRunner, TargetOutcome};
use vitrine_core::settings::EngineSettings;
use vitrine_core::target::{CrawlTarget, TargetResolver};
use vitrine_core::throttle::ThrottledProvider;
use vitrine_core::traits::SessionProvider;
use vitrine_core::TracingCrawlReporter;

#[derive(Parser)]
#[command(name = "vitrine", version, about = "Paginated catalog scraper")]
struct Cli {
    /// Directory holding preset target files
    #[arg(long, global = true, env = "VITRINE_TARGETS_DIR")]
    targets_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more targets and write their CSV files
    Crawl {
        /// Preset names (e.g. "zonasul") or paths to target JSON files
        #[arg(required = true)]
        targets: Vec<String>,

        /// Override the output path (single target only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Targets crawled at once
        #[arg(short, long, env = "VITRINE_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Fetch plain HTML instead of driving a browser (no clicks, no scrolling)
        #[arg(long, default_value_t = false)]
        http: bool,

        /// Allow requests to private/reserved addresses in HTTP mode
        #[arg(long, default_value_t = false)]
        allow_private_urls: bool,

        /// Also write the crawl reports as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load targets and compile their selectors and predicates without crawling
    Check {
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// List the preset targets
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vitrine=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = EngineSettings::from_env().context("Invalid VITRINE_* settings")?;
    if let Some(dir) = cli.targets_dir {
        settings.targets_dir = dir;
    }
    let resolver = TargetResolver::new(&settings.targets_dir);

    match cli.command {
        Commands::Crawl {
            targets,
            output,
            concurrency,
            http,
            allow_private_urls,
            report,
        } => {
            if let Some(n) = concurrency {
                settings.concurrency = n.max(1);
            }
            let mut targets = load_targets(&resolver, &targets)?;
            if let Some(path) = output {
                if targets.len() != 1 {
                    bail!("--output applies to a single target, got {}", targets.len());
                }
                targets = targets
                    .into_iter()
                    .map(|t| t.with_output_path(&path))
                    .collect();
            }
            cmd_crawl(&settings, targets, http, allow_private_urls, report).await?;
        }
        Commands::Check { targets } => cmd_check(&resolver, &targets)?,
        Commands::List => cmd_list(&resolver)?,
    }

    Ok(())
}

fn load_targets(resolver: &TargetResolver, references: &[String]) -> Result<Vec<CrawlTarget>> {
    references
        .iter()
        .map(|reference| {
            let resolved = resolver
                .resolve(reference)
                .with_context(|| format!("Failed to load target '{reference}'"))?;
            resolved
                .target
                .check()
                .with_context(|| format!("Target {} is invalid", resolved.path.display()))?;
            Ok(resolved.target)
        })
        .collect()
}

async fn cmd_crawl(
    settings: &EngineSettings,
    targets: Vec<CrawlTarget>,
    http: bool,
    allow_private_urls: bool,
    report: Option<PathBuf>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing current pages and writing partial results");
            ctrl_c.cancel();
        }
    });

    let outcomes = if http {
        let mut provider = HttpProvider::new().context("Failed to create HTTP client")?;
        if allow_private_urls {
            provider = provider.allow_private_urls();
        }
        run_throttled(provider, settings, &targets, &cancel).await
    } else {
        run_browser(settings, &targets, &cancel).await?
    };

    print_summary(&targets, &outcomes);

    if let Some(path) = report {
        let reports: Vec<_> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect();
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} target(s) failed", outcomes.len());
    }
    Ok(())
}

#[cfg(feature = "browser")]
async fn run_browser(
    settings: &EngineSettings,
    targets: &[CrawlTarget],
    cancel: &CancellationToken,
) -> Result<Vec<TargetOutcome>> {
    let launcher = vitrine_client::ChromiumLauncher::launch()
        .await
        .context("Failed to launch Chromium (set CHROME_BIN to point at a Chrome binary)")?;
    Ok(run_throttled(launcher, settings, targets, cancel).await)
}

#[cfg(not(feature = "browser"))]
async fn run_browser(
    _settings: &EngineSettings,
    _targets: &[CrawlTarget],
    _cancel: &CancellationToken,
) -> Result<Vec<TargetOutcome>> {
    bail!("This build has no browser support; rebuild with --features browser or pass --http")
}

async fn run_throttled<P: SessionProvider>(
    provider: P,
    settings: &EngineSettings,
    targets: &[CrawlTarget],
    cancel: &CancellationToken,
) -> Vec<TargetOutcome> {
    match settings.throttle() {
        Some(config) => {
            let provider = ThrottledProvider::new(provider, config);
            run(provider, settings, targets, cancel).await
        }
        None => run(provider, settings, targets, cancel).await,
    }
}

async fn run<P: SessionProvider>(
    provider: P,
    settings: &EngineSettings,
    targets: &[CrawlTarget],
    cancel: &CancellationToken,
) -> Vec<TargetOutcome> {
    let service = CrawlService::new(
        provider,
        ReadinessGate::new(settings.readiness()),
        settings.retry(),
    );
    CrawlRunner::new(service, settings.concurrency)
        .run(targets, CrawlTarget::sink, cancel, &TracingCrawlReporter)
        .await
}

fn print_summary(targets: &[CrawlTarget], outcomes: &[TargetOutcome]) {
    println!("{:<14} {:>8} {:>6}  {:<18} OUTPUT", "TARGET", "RECORDS", "PAGES", "STATUS");
    for (target, outcome) in targets.iter().zip(outcomes) {
        match &outcome.result {
            Ok(report) => {
                let status = report
                    .sources
                    .iter()
                    .map(|s| s.termination.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let status = if status.is_empty() {
                    "cancelled".to_string()
                } else {
                    status
                };
                println!(
                    "{:<14} {:>8} {:>6}  {:<18} {}{}",
                    outcome.name,
                    report.records.len(),
                    report.pages(),
                    status,
                    target.output.path.display(),
                    if report.best_effort() { " (best effort)" } else { "" }
                );
            }
            Err(e) => {
                println!("{:<14} {:>8} {:>6}  {:<18} {e}", outcome.name, "-", "-", "failed");
            }
        }
    }
}

fn cmd_check(resolver: &TargetResolver, references: &[String]) -> Result<()> {
    let mut invalid = 0;
    for reference in references {
        let checked = resolver
            .resolve(reference)
            .and_then(|resolved| resolved.target.check().map(|()| resolved));
        match checked {
            Ok(resolved) => println!(
                "ok      {} ({}, {} start URL(s)) -> {}",
                resolved.target.name,
                resolved.target.pagination.label(),
                resolved.target.urls.len(),
                resolved.target.output.path.display()
            ),
            Err(e) => {
                invalid += 1;
                println!("invalid {reference}: {e}");
            }
        }
    }
    if invalid > 0 {
        bail!("{invalid} invalid target(s)");
    }
    Ok(())
}

fn cmd_list(resolver: &TargetResolver) -> Result<()> {
    let presets = resolver.presets().context("Failed to list presets")?;
    if presets.is_empty() {
        println!("No presets found");
        return Ok(());
    }
    for name in presets {
        match resolver.resolve(&name) {
            Ok(resolved) => println!(
                "{:<14} {:<16} {}",
                name,
                resolved.target.pagination.label(),
                resolved.target.urls.first().map(String::as_str).unwrap_or("-")
            ),
            Err(e) => println!("{name:<14} (unreadable: {e})"),
        }
    }
    Ok(())
}
