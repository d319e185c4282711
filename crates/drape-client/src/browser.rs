use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::emulation::{
    SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use drape_core::error::AppError;
use drape_core::traits::{Document, PageSource, Scope};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;

/// Desktop user agents rotated across pages.
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// How the browser presents itself to the site.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a visible window. Off by default.
    pub headless: bool,
    /// Upper bound for a single CDP request.
    pub request_timeout: Duration,
    pub user_agents: Vec<String>,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            request_timeout: Duration::from_secs(30),
            user_agents: DESKTOP_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            viewport: (1920, 1080),
            locale: "en-US".into(),
            timezone: "Asia/Seoul".into(),
        }
    }
}

impl BrowserOptions {
    /// Picks one of the configured user agents at random.
    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
    }
}

/// One running Chromium process driven over the DevTools protocol.
///
/// Pages handed out by [`PageSource::open_page`] share the process; call
/// [`ChromeSession::shutdown`] once the run is over, whether it succeeded or
/// not, to terminate it.
pub struct ChromeSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    options: BrowserOptions,
}

impl ChromeSession {
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let (width, height) = options.viewport;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(options.request_timeout)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            });

        if !options.headless {
            builder = builder.with_head();
        }

        // Snap-packaged Chromium ships a wrapper that drops unknown flags,
        // so prefer the real binary when one can be found.
        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg(format!("--lang={}", options.locale))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Browser(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("Browser CDP handler error: {e}");
                    break;
                }
            }
        });

        tracing::info!(
            headless = options.headless,
            locale = %options.locale,
            timezone = %options.timezone,
            "Browser launched"
        );
        Ok(Self {
            browser,
            handler_task,
            options,
        })
    }

    /// Closes the browser and waits for the process to exit. Best effort.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::warn!("Failed waiting for browser exit: {e}");
        }
        self.handler_task.abort();
        tracing::info!("Browser closed");
    }

    async fn emulate(&self, page: &Page) -> Result<(), AppError> {
        if let Some(agent) = self.options.pick_user_agent() {
            let params = SetUserAgentOverrideParams::builder()
                .user_agent(agent)
                .accept_language(self.options.locale.clone())
                .build()
                .map_err(AppError::Browser)?;
            page.execute(params).await.map_err(cdp("set user agent"))?;
        }
        page.execute(SetLocaleOverrideParams {
            locale: Some(self.options.locale.clone()),
        })
        .await
        .map_err(cdp("set locale"))?;
        page.execute(SetTimezoneOverrideParams::new(self.options.timezone.clone()))
            .await
            .map_err(cdp("set timezone"))?;
        Ok(())
    }
}

/// Launches a browser, runs `run` against it and shuts it down again,
/// on success and on error alike.
pub async fn with_session<T, F>(options: BrowserOptions, run: F) -> Result<T, AppError>
where
    F: AsyncFnOnce(&ChromeSession) -> Result<T, AppError>,
{
    let session = ChromeSession::launch(options).await?;
    let result = run(&session).await;
    session.shutdown().await;
    result
}

impl PageSource for ChromeSession {
    type Page = ChromePage;

    async fn open_page(&self) -> Result<ChromePage, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(cdp("open page"))?;
        if let Err(e) = self.emulate(&page).await {
            if let Err(close_err) = page.close().await {
                tracing::warn!("Failed to close page: {close_err}");
            }
            return Err(e);
        }
        Ok(ChromePage { page })
    }
}

/// A browser tab implementing [`Document`].
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    async fn find_all(
        &self,
        scope: Scope<'_, Element>,
        selector: &str,
    ) -> Result<Vec<Element>, AppError> {
        // querySelectorAll yields an empty list for no match, unlike
        // find_element which reports absence as an error.
        let found = match scope {
            Scope::Document => self.page.find_elements(selector).await,
            Scope::Within(parent) => parent.find_elements(selector).await,
        };
        found.map_err(|e| AppError::Browser(format!("Query '{selector}' failed: {e}")))
    }
}

impl Document for ChromePage {
    type Element = Element;

    async fn goto(&self, url: &str) -> Result<(), AppError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }

    async fn query_selector(
        &self,
        scope: Scope<'_, Element>,
        selector: &str,
    ) -> Result<Option<Element>, AppError> {
        Ok(self.find_all(scope, selector).await?.into_iter().next())
    }

    async fn query_selector_all(
        &self,
        scope: Scope<'_, Element>,
        selector: &str,
    ) -> Result<Vec<Element>, AppError> {
        self.find_all(scope, selector).await
    }

    async fn inner_text(&self, element: &Element) -> Result<String, AppError> {
        let text = element.inner_text().await.map_err(cdp("read text"))?;
        Ok(text.unwrap_or_default())
    }

    async fn get_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, AppError> {
        element.attribute(name).await.map_err(cdp("read attribute"))
    }

    async fn click(&self, element: &Element) -> Result<(), AppError> {
        element.click().await.map_err(cdp("click"))?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, AppError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| AppError::Browser(format!("Script `{expression}` failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Polls for `selector` with exponential backoff (100ms doubling, capped at 1s).
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Element, AppError> {
        let start = Instant::now();
        let mut poll_interval = Duration::from_millis(100);
        let max_interval = Duration::from_secs(1);

        loop {
            if let Some(element) = self.query_selector(Scope::Document, selector).await? {
                return Ok(element);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(AppError::SelectorTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            tracing::warn!("Failed to close page: {e}");
        }
    }
}

fn cdp(action: &'static str) -> impl Fn(chromiumoxide::error::CdpError) -> AppError {
    move |e| AppError::Browser(format!("Failed to {action}: {e}"))
}

/// Locates a usable Chrome/Chromium binary.
///
/// `CHROME_BIN` wins when it points at an existing file; otherwise the real
/// snap binary and well-known system paths are tried. `None` leaves the
/// lookup to chromiumoxide.
pub fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("CHROME_BIN={p} does not exist, falling back to defaults");
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
