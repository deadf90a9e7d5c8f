use crate::botwall;
use crate::error::{RenderError, Result};
use crate::result::PageRenderResult;
use async_trait::async_trait;
use headless_chrome::browser::default_executable;
use headless_chrome::{Browser, LaunchOptions, Tab};
use reqwest::Client;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How long rendered pages are given to settle after the load event, so
/// client-side frameworks can mount their forms.
const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Wait after a simulated click before checking whether a form appeared.
const POST_CLICK_DELAY: Duration = Duration::from_secs(2);

/// Attribute selectors that tend to mark login affordances.
const CLICK_SELECTORS: &[&str] = &[
    "[data-testid*=login]",
    "[data-testid*=signin]",
    "[class*=login]",
    "[class*=signin]",
];

/// Containers inspected after a click for a freshly mounted auth form.
const FORM_CONTAINER_SELECTORS: &[&str] = &["form", "[data-testid*=login]", "[class*=login]"];

const CREDENTIAL_KEYWORDS: &[&str] = &["password", "email", "username"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Plain HTTP fetch of the initial server response.
    StaticFetch,
    /// Full browser session; scripts run before content is extracted.
    FullBrowser,
}

/// Obtains a rendered HTML document for a URL. The two implementations
/// differ in cost by orders of magnitude, which is why the exploration
/// controller always tries the cheap one first.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, mode: RenderMode) -> Result<PageRenderResult>;

    fn supports_browser(&self) -> bool {
        false
    }

    /// Interactive simulation: click login affordances and return the
    /// outer HTML of an auth form that appears, if any. Only meaningful
    /// for browser-backed renderers.
    async fn probe_login_click(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Static renderer over a pooled reqwest client.
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new() -> Self {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<PageRenderResult> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let body = response.text().await?;

        let verdict = botwall::inspect(&body);
        if verdict.blocked {
            let evidence = verdict.evidence.unwrap_or_default();
            info!(url, evidence, "page blocked by anti-bot protection");
            return Ok(PageRenderResult::blocked(url.to_string(), body, evidence));
        }

        Ok(PageRenderResult::new(url.to_string(), body))
    }
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str, _mode: RenderMode) -> Result<PageRenderResult> {
        // A static renderer has exactly one strategy.
        self.fetch(url).await
    }
}

/// Browser-backed renderer. Each render launches a fresh headless Chrome
/// inside `spawn_blocking`; the `Browser` value never escapes the closure,
/// so the process is released on every exit path when it drops.
pub struct ChromeRenderer {
    fallback: HttpRenderer,
    settle_delay: Duration,
}

impl ChromeRenderer {
    pub fn new() -> Self {
        Self {
            fallback: HttpRenderer::new(),
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Timeout applies to the static-fetch fallback; browser sessions are
    /// bounded by their own idle timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            fallback: HttpRenderer::with_timeout(timeout_secs),
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    async fn render_in_browser(&self, url: &str) -> Result<PageRenderResult> {
        let url = url.to_string();
        let settle = self.settle_delay;

        let browser_url = url.clone();
        let html = tokio::task::spawn_blocking(move || -> Result<String> {
            let browser = launch_browser()?;
            let tab = new_tab(&browser)?;
            debug!("Navigating browser to {}", browser_url);
            tab.navigate_to(&browser_url).map_err(browser_err)?;
            tab.wait_until_navigated().map_err(browser_err)?;
            std::thread::sleep(settle);
            tab.get_content().map_err(browser_err)
        })
        .await??;

        debug!(chars = html.len(), "browser render complete");

        let verdict = botwall::inspect(&html);
        if verdict.blocked {
            let evidence = verdict.evidence.unwrap_or_default();
            info!(evidence, "rendered page blocked by anti-bot protection");
            return Ok(PageRenderResult::blocked(url, html, evidence));
        }

        Ok(PageRenderResult::new(url, html))
    }
}

impl Default for ChromeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str, mode: RenderMode) -> Result<PageRenderResult> {
        match mode {
            RenderMode::StaticFetch => self.fallback.render(url, mode).await,
            RenderMode::FullBrowser => self.render_in_browser(url).await,
        }
    }

    fn supports_browser(&self) -> bool {
        true
    }

    async fn probe_login_click(&self, url: &str) -> Result<Option<String>> {
        let url = url.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let browser = launch_browser()?;
            let tab = new_tab(&browser)?;
            tab.navigate_to(&url).map_err(browser_err)?;
            tab.wait_until_navigated().map_err(browser_err)?;
            std::thread::sleep(POST_CLICK_DELAY);

            for selector in CLICK_SELECTORS {
                let elements = match tab.find_elements(selector) {
                    Ok(elements) => elements,
                    Err(_) => continue,
                };
                for element in elements.iter().take(2) {
                    if element.click().is_err() {
                        continue;
                    }
                    std::thread::sleep(POST_CLICK_DELAY);
                    if let Some(fragment) = find_auth_container(&tab) {
                        return Ok(Some(fragment));
                    }
                }
            }

            // Second pass: clickable elements whose visible text reads
            // like a login affordance.
            if let Ok(clickables) = tab.find_elements("a, button, [role=button]") {
                for element in clickables {
                    let text = element.get_inner_text().unwrap_or_default();
                    if !is_login_text(&text) {
                        continue;
                    }
                    if element.click().is_err() {
                        continue;
                    }
                    std::thread::sleep(POST_CLICK_DELAY);
                    if let Some(fragment) = find_auth_container(&tab) {
                        return Ok(Some(fragment));
                    }
                }
            }

            Ok(None)
        })
        .await?
    }
}

fn launch_browser() -> Result<Browser> {
    let user_agent = OsString::from(format!("--user-agent={USER_AGENT}"));
    let no_automation = OsString::from("--disable-blink-features=AutomationControlled");
    let no_shm = OsString::from("--disable-dev-shm-usage");

    let mut builder = LaunchOptions::default_builder();
    builder
        .headless(true)
        .sandbox(false)
        .window_size(Some((1280, 1024)))
        .idle_browser_timeout(Duration::from_secs(60))
        .args(vec![
            user_agent.as_os_str(),
            no_automation.as_os_str(),
            no_shm.as_os_str(),
        ]);

    if let Ok(executable) = default_executable() {
        builder.path(Some(executable));
    }

    let options = builder
        .build()
        .map_err(|e| RenderError::Browser(e.to_string()))?;

    Browser::new(options).map_err(|e| RenderError::Browser(e.to_string()))
}

fn new_tab(browser: &Browser) -> Result<Arc<Tab>> {
    browser.new_tab().map_err(browser_err)
}

fn browser_err(e: anyhow::Error) -> RenderError {
    warn!("browser operation failed: {}", e);
    RenderError::Browser(e.to_string())
}

fn find_auth_container(tab: &Arc<Tab>) -> Option<String> {
    for selector in FORM_CONTAINER_SELECTORS {
        let elements = match tab.find_elements(selector) {
            Ok(elements) => elements,
            Err(_) => continue,
        };
        for element in elements {
            let html = match element.get_content() {
                Ok(html) => html,
                Err(_) => continue,
            };
            let lowered = html.to_lowercase();
            if CREDENTIAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
                return Some(html);
            }
        }
    }
    None
}

fn is_login_text(text: &str) -> bool {
    let squashed: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    squashed.contains("login") || squashed.contains("signin")
}
