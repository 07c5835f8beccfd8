use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use vitrine_core::error::CrawlError;
use vitrine_core::traits::{Action, BrowserSession, Query, SessionProvider};

/// Headless Chromium driven over the Chrome DevTools Protocol.
///
/// One Chromium process is shared by all clones; every
/// [`SessionProvider::open`] opens a fresh tab, so concurrent targets never
/// share page state.
///
/// # Example
///
/// ```rust,no_run
/// use vitrine_client::ChromiumLauncher;
/// use vitrine_core::traits::{BrowserSession, SessionProvider};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let launcher = ChromiumLauncher::launch().await?;
/// let session = launcher.open().await?;
/// session.navigate("https://www.zonasul.com.br/americanos").await?;
/// let html = session.page_source().await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChromiumLauncher {
    browser: Arc<Browser>,
    nav_timeout: Duration,
}

impl ChromiumLauncher {
    /// Launch headless Chromium with a **30 s** navigation timeout.
    pub async fn launch() -> Result<Self, CrawlError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(nav_timeout: Duration) -> Result<Self, CrawlError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--no-first-run")
            .arg("--window-size=1366,900")
            .build()
            .map_err(|e| CrawlError::Session(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CrawlError::Session(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            nav_timeout,
        })
    }
}

impl SessionProvider for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn open(&self) -> Result<ChromiumSession, CrawlError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::Session(format!("Failed to open tab: {e}")))?;
        Ok(ChromiumSession {
            page,
            nav_timeout: self.nav_timeout,
        })
    }
}

/// Look for a real Chrome/Chromium binary.
///
/// `CHROME_BIN` wins. Snap-packaged Chromium's `/snap/bin` wrapper strips
/// headless flags, so the binary inside the snap is preferred over it. With
/// nothing found, `chromiumoxide` does its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_BIN").map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "CHROME_BIN does not exist, ignoring");
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// One Chromium tab.
pub struct ChromiumSession {
    page: Page,
    nav_timeout: Duration,
}

impl ChromiumSession {
    async fn find_all(&self, query: &Query) -> Result<Vec<Element>, CrawlError> {
        let found = match query {
            Query::Css(css) => self.page.find_elements(css.as_str()).await,
            Query::XPath(xpath) => self.page.find_xpaths(xpath.as_str()).await,
        };
        match found {
            Ok(elements) => Ok(elements),
            // CDP reports "no such node" as an error; for us it is absence.
            Err(e) => {
                tracing::trace!(%query, error = %e, "Query matched nothing");
                Ok(Vec::new())
            }
        }
    }
}

impl BrowserSession for ChromiumSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        let load = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| CrawlError::Network(format!("Failed to navigate to {url}: {e}")))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| CrawlError::Network(format!("Navigation to {url} failed: {e}")))?;
            Ok::<(), CrawlError>(())
        };

        match tokio::time::timeout(self.nav_timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::Timeout(self.nav_timeout.as_millis() as u64)),
        }
    }

    async fn locate(&self, query: &Query) -> Result<Option<Element>, CrawlError> {
        Ok(self.find_all(query).await?.into_iter().next())
    }

    async fn locate_all(&self, query: &Query) -> Result<Vec<Element>, CrawlError> {
        self.find_all(query).await
    }

    async fn act(&self, element: &Element, action: Action) -> Result<(), CrawlError> {
        let result = match action {
            Action::Click => element.click().await.map(|_| ()),
            Action::ScrollIntoView => element.scroll_into_view().await.map(|_| ()),
        };
        result.map_err(|e| {
            let message = e.to_string();
            if message.contains("No node") || message.contains("detached") {
                CrawlError::StaleElement(message)
            } else {
                CrawlError::Interaction(format!("{action:?} failed: {message}"))
            }
        })
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        self.page
            .url()
            .await
            .map_err(|e| CrawlError::Session(format!("Failed to read URL: {e}")))?
            .ok_or_else(|| CrawlError::Session("Page has no URL".into()))
    }

    async fn page_source(&self) -> Result<String, CrawlError> {
        self.page
            .content()
            .await
            .map_err(|e| CrawlError::Session(format!("Failed to read page content: {e}")))
    }

    async fn execute_probe(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| CrawlError::Interaction(format!("Script failed: {e}")))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| CrawlError::Session(format!("Failed to close tab: {e}")))
    }
}
