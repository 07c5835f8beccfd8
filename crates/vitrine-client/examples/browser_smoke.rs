/// Smoke-test for `ChromiumLauncher`.
///
/// Launches a headless Chromium, opens <https://example.com> in a session,
/// and checks that the heading is locatable and the rendered markup is
/// readable.
///
/// Run with:
///   cargo run -p vitrine-client --example browser_smoke --features browser
use vitrine_client::ChromiumLauncher;
use vitrine_core::traits::{BrowserSession, Query, SessionProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let launcher = ChromiumLauncher::launch().await?;
    let session = launcher.open().await?;

    let url = "https://example.com";
    println!("Navigating to {url} …");
    session.navigate(url).await?;

    let heading = session.locate(&Query::Css("h1".into())).await?;
    anyhow::ensure!(heading.is_some(), "Expected <h1> not located");

    let height = session
        .execute_probe("document.body.scrollHeight")
        .await?;
    let html = session.page_source().await?;
    session.close().await?;

    println!(
        "OK: {} bytes of rendered HTML, scrollHeight {height}, URL {}",
        html.len(),
        url
    );
    Ok(())
}
