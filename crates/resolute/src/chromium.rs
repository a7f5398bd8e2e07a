//! Chromium engine over the Chrome `DevTools` Protocol.
//!
//! Locators are evaluated in page context through
//! [`LocatorSpec::to_collect_query`]; pointer input and file inputs go
//! through CDP commands. Only compiled with the `browser` feature.

use crate::driver::{
    ClickOptions, ElementInfo, LoadState, PageDriver, PopupWaiter, Probe, ResponseWaiter,
};
use crate::locator::LocatorSpec;
use crate::result::{ResoluteError, ResoluteResult};
use crate::session::{Cookie, SameSite, StorageState};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, EventResponseReceived, GetResponseBodyParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::cdp::browser_protocol::target::EventTargetCreated;
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

const VISIBLE_FN: &str = "const visible = el => { const r = el.getBoundingClientRect(); \
    const s = getComputedStyle(el); return r.width > 0 && r.height > 0 && \
    s.visibility !== 'hidden' && s.display !== 'none'; };";

/// Chromium launch settings
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Run without a window
    pub headless: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<PathBuf>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Interval between in-page visibility polls
    pub poll_interval: Duration,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            sandbox: true,
            viewport_width: 1280,
            viewport_height: 800,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ChromiumConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// A running Chromium
#[derive(Debug)]
pub struct ChromiumBrowser {
    config: ChromiumConfig,
    inner: Arc<Mutex<CdpBrowser>>,
    handle: tokio::task::JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launch Chromium
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched
    pub async fn launch(config: ChromiumConfig) -> ResoluteResult<Self> {
        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| ResoluteError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| ResoluteError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler error");
                }
            }
        });

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(browser)),
            handle,
        })
    }

    /// Open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the page cannot be created
    pub async fn new_page(&self) -> ResoluteResult<Arc<ChromiumPage>> {
        let page = self
            .inner
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?;
        Ok(Arc::new(ChromiumPage::new(
            page,
            Arc::clone(&self.inner),
            self.config.poll_interval,
        )))
    }

    /// Launch settings
    #[must_use]
    pub const fn config(&self) -> &ChromiumConfig {
        &self.config
    }

    /// Close the browser
    ///
    /// # Errors
    ///
    /// Returns error if the browser refuses to close
    pub async fn close(self) -> ResoluteResult<()> {
        let result = self.inner.lock().await.close().await;
        self.handle.abort();
        result.map_err(|e| ResoluteError::BrowserLaunch {
            message: e.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeResult {
    count: usize,
    #[serde(default)]
    visible: Option<ElementInfo>,
}

#[derive(Debug, Deserialize)]
struct ClickTarget {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct LocalStorageDump {
    origin: String,
    entries: Vec<(String, String)>,
}

/// A Chromium tab
#[derive(Debug, Clone)]
pub struct ChromiumPage {
    page: CdpPage,
    browser: Arc<Mutex<CdpBrowser>>,
    poll_interval: Duration,
}

impl ChromiumPage {
    fn new(page: CdpPage, browser: Arc<Mutex<CdpBrowser>>, poll_interval: Duration) -> Self {
        Self {
            page,
            browser,
            poll_interval,
        }
    }

    async fn eval_value(&self, script: &str) -> ResoluteResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ResoluteError::Script {
                message: e.to_string(),
            })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_as<T: serde::de::DeserializeOwned>(&self, script: &str) -> ResoluteResult<T> {
        let value = self.eval_value(script).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn run_on_element(
        &self,
        locator: &LocatorSpec,
        body: &str,
        only_visible: bool,
        nth: usize,
    ) -> ResoluteResult<()> {
        let hit: bool = self
            .eval_as(&element_script(locator, body, only_visible, nth))
            .await?;
        if hit {
            Ok(())
        } else {
            Err(ResoluteError::interaction(locator.to_string(), "no element"))
        }
    }

    async fn is_open(&self) -> ResoluteResult<bool> {
        let pages = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?;
        let own = self.page.target_id();
        Ok(pages.iter().any(|p| p.target_id() == own))
    }

    async fn ready_state_reached(&self, state: LoadState) -> ResoluteResult<bool> {
        let ready: String = self.eval_as("document.readyState").await?;
        Ok(match state {
            LoadState::DomContentLoaded => ready != "loading",
            LoadState::Load | LoadState::NetworkIdle => ready == "complete",
        })
    }

    async fn resource_count(&self) -> ResoluteResult<u64> {
        self.eval_as("performance.getEntriesByType('resource').length")
            .await
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, wait_until: LoadState, timeout: Duration) -> ResoluteResult<()> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ResoluteError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ResoluteError::timeout(
                    timeout.as_millis() as u64,
                    format!("navigation to {url}"),
                ))
            }
        }
        let remaining = timeout.saturating_sub(start.elapsed());
        self.wait_for_load_state(wait_until, remaining).await
    }

    async fn current_url(&self) -> ResoluteResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?
            .unwrap_or_default())
    }

    async fn wait_for_visible(&self, locator: &LocatorSpec, timeout: Duration) -> ResoluteResult<Probe> {
        let deadline = Instant::now() + timeout;
        let script = probe_script(locator);
        loop {
            let probe: ProbeResult = self.eval_as(&script).await?;
            if let Some(info) = probe.visible {
                return Ok(Probe::Visible(info));
            }
            if Instant::now() + self.poll_interval > deadline {
                return Ok(if probe.count > 0 {
                    Probe::Hidden { count: probe.count }
                } else {
                    Probe::Absent
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn texts(&self, locator: &LocatorSpec) -> ResoluteResult<Vec<String>> {
        self.eval_as(&format!(
            "(() => {{ {VISIBLE_FN} return {}.filter(visible).map(el => (el.innerText || el.textContent || '').trim()); }})()",
            locator.to_collect_query()
        ))
        .await
    }

    async fn attribute(&self, locator: &LocatorSpec, name: &str) -> ResoluteResult<Option<String>> {
        self.eval_as(&format!(
            "(() => {{ const el = {}[0]; return el ? el.getAttribute({}) : null; }})()",
            locator.to_collect_query(),
            serde_json::Value::from(name)
        ))
        .await
    }

    async fn scroll_into_view(&self, locator: &LocatorSpec) -> ResoluteResult<()> {
        self.run_on_element(locator, "el.scrollIntoView({ block: 'center', inline: 'center' });", false, 0)
            .await
    }

    async fn click(&self, locator: &LocatorSpec, options: ClickOptions) -> ResoluteResult<()> {
        let script = format!(
            "(() => {{ {VISIBLE_FN} const els = {}.filter(visible); const el = els[{}]; \
             if (!el) return null; el.scrollIntoView({{ block: 'center' }}); \
             const r = el.getBoundingClientRect(); \
             return {{ x: r.left + r.width / 2, y: r.top + r.height / 2 }}; }})()",
            locator.to_collect_query(),
            options.nth
        );
        let target: Option<ClickTarget> = self.eval_as(&script).await?;
        let target =
            target.ok_or_else(|| ResoluteError::interaction(locator.to_string(), "no visible element"))?;

        if !options.force {
            let hit: bool = self
                .eval_as(&hit_test_script(locator, options.nth, target.x, target.y))
                .await?;
            if !hit {
                return Err(ResoluteError::interaction(
                    locator.to_string(),
                    "element is covered by another element",
                ));
            }
        }

        self.page
            .click(Point::new(target.x, target.y))
            .await
            .map_err(|e| ResoluteError::interaction(locator.to_string(), e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, locator: &LocatorSpec) -> ResoluteResult<()> {
        self.run_on_element(
            locator,
            "el.focus(); el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true }));",
            true,
            0,
        )
        .await
    }

    async fn fill(&self, locator: &LocatorSpec, text: &str) -> ResoluteResult<()> {
        self.run_on_element(locator, "el.focus();", true, 0).await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(|e| ResoluteError::interaction(locator.to_string(), e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> ResoluteResult<serde_json::Value> {
        self.eval_value(script).await
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> ResoluteResult<()> {
        let deadline = Instant::now() + timeout;
        let quiet_window = Duration::from_millis(500);
        let mut last_count = None;
        let mut quiet_since = Instant::now();

        loop {
            if self.ready_state_reached(state).await? {
                if state != LoadState::NetworkIdle {
                    return Ok(());
                }
                let count = self.resource_count().await?;
                if last_count == Some(count) {
                    if quiet_since.elapsed() >= quiet_window {
                        return Ok(());
                    }
                } else {
                    last_count = Some(count);
                    quiet_since = Instant::now();
                }
            }
            if Instant::now() >= deadline {
                return Err(ResoluteError::timeout(
                    timeout.as_millis() as u64,
                    format!("load state {state}"),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> ResoluteResult<()> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| ResoluteError::Screenshot {
                message: e.to_string(),
            })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| ResoluteError::Screenshot {
                message: e.to_string(),
            })?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn set_input_files(&self, locator: &LocatorSpec, files: &[PathBuf]) -> ResoluteResult<()> {
        // tag the input so CDP can address it by CSS whatever the locator kind
        self.run_on_element(
            locator,
            "document.querySelectorAll('[data-resolute-upload]').forEach(e => e.removeAttribute('data-resolute-upload')); \
             el.setAttribute('data-resolute-upload', '1');",
            false,
            0,
        )
        .await?;
        let element = self
            .page
            .find_element("[data-resolute-upload]")
            .await
            .map_err(|e| ResoluteError::interaction(locator.to_string(), e.to_string()))?;
        let paths = files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>();
        let params = SetFileInputFilesParams::builder()
            .files(paths)
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|message| ResoluteError::interaction(locator.to_string(), message))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| ResoluteError::interaction(locator.to_string(), e.to_string()))?;
        Ok(())
    }

    async fn expect_popup(&self) -> ResoluteResult<PopupWaiter> {
        let mut created = self
            .browser
            .lock()
            .await
            .event_listener::<EventTargetCreated>()
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?;
        let opener = self.page.target_id().clone();
        let browser = Arc::clone(&self.browser);
        let poll_interval = self.poll_interval;
        let (tx, rx) = oneshot::channel();

        let listener = tokio::spawn(async move {
            while let Some(event) = created.next().await {
                let info = &event.target_info;
                if info.r#type != "page" || info.opener_id.as_ref() != Some(&opener) {
                    continue;
                }
                // the target shows up in pages() only once attached
                while !tx.is_closed() {
                    match browser.lock().await.pages().await {
                        Ok(pages) => {
                            if let Some(page) =
                                pages.into_iter().find(|p| p.target_id() == &info.target_id)
                            {
                                let popup: Arc<dyn PageDriver> = Arc::new(ChromiumPage::new(
                                    page,
                                    Arc::clone(&browser),
                                    poll_interval,
                                ));
                                let _ = tx.send(popup);
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "cannot list pages for popup"),
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                return;
            }
        });
        Ok(PopupWaiter::new(rx).with_task(listener.abort_handle()))
    }

    async fn expect_response(&self, url_fragment: &str) -> ResoluteResult<ResponseWaiter> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?;
        let page = self.page.clone();
        let fragment = url_fragment.to_string();
        let (tx, rx) = oneshot::channel();

        let listener = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if !event.response.url.contains(&fragment) {
                    continue;
                }
                // the body is only retrievable once loading finished
                for _ in 0..10 {
                    match page
                        .execute(GetResponseBodyParams::new(event.request_id.clone()))
                        .await
                    {
                        Ok(body) => {
                            let text = if body.base64_encoded {
                                base64::engine::general_purpose::STANDARD
                                    .decode(&body.body)
                                    .ok()
                                    .and_then(|b| String::from_utf8(b).ok())
                                    .unwrap_or_default()
                            } else {
                                body.body.clone()
                            };
                            match serde_json::from_str(&text) {
                                Ok(value) => {
                                    let _ = tx.send(value);
                                }
                                Err(e) => debug!(url = %event.response.url, error = %e, "response is not JSON"),
                            }
                            return;
                        }
                        Err(_) => tokio::time::sleep(Duration::from_millis(200)).await,
                    }
                }
                return;
            }
        });
        Ok(ResponseWaiter::new(url_fragment, rx).with_task(listener.abort_handle()))
    }

    async fn wait_for_close(&self, timeout: Duration) -> ResoluteResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_open().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval.max(Duration::from_millis(250))).await;
        }
    }

    async fn storage_state(&self) -> ResoluteResult<StorageState> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| ResoluteError::page(e.to_string()))?;
        let mut state = StorageState::new();
        for c in cookies {
            let mut cookie = Cookie::new(&c.name, &c.value, &c.domain).with_expires(c.expires);
            cookie.path = c.path;
            cookie.http_only = c.http_only;
            cookie.secure = c.secure;
            cookie.same_site = c.same_site.map(|s| match s {
                CookieSameSite::Strict => SameSite::Strict,
                CookieSameSite::Lax => SameSite::Lax,
                CookieSameSite::None => SameSite::None,
            });
            state = state.with_cookie(cookie);
        }

        let dump: LocalStorageDump = self
            .eval_as(
                "({ origin: location.origin, entries: Object.keys(localStorage).map(k => [k, localStorage.getItem(k)]) })",
            )
            .await?;
        for (name, value) in &dump.entries {
            state = state.with_local_storage(&dump.origin, name, value);
        }
        Ok(state)
    }

    async fn apply_storage_state(&self, state: &StorageState) -> ResoluteResult<()> {
        let params = state
            .cookies
            .iter()
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.domain = Some(c.domain.clone());
                param.path = Some(c.path.clone());
                param.secure = Some(c.secure);
                param.http_only = Some(c.http_only);
                if c.expires > 0.0 {
                    param.expires = Some(TimeSinceEpoch::new(c.expires));
                }
                param.same_site = c.same_site.map(|s| match s {
                    SameSite::Strict => CookieSameSite::Strict,
                    SameSite::Lax => CookieSameSite::Lax,
                    SameSite::None => CookieSameSite::None,
                });
                param
            })
            .collect::<Vec<_>>();
        if !params.is_empty() {
            self.page
                .set_cookies(params)
                .await
                .map_err(|e| ResoluteError::page(e.to_string()))?;
        }

        let origin: String = self.eval_as("location.origin").await?;
        for storage in state.origins.iter().filter(|o| o.origin == origin) {
            let entries = serde_json::to_string(
                &storage
                    .local_storage
                    .iter()
                    .map(|nv| (&nv.name, &nv.value))
                    .collect::<Vec<_>>(),
            )?;
            let _ = self
                .eval_value(&format!(
                    "(() => {{ for (const [k, v] of {entries}) localStorage.setItem(k, v); return true; }})()"
                ))
                .await?;
        }
        Ok(())
    }
}

/// Script reporting the match count and the first visible match
#[must_use]
pub fn probe_script(locator: &LocatorSpec) -> String {
    format!(
        "(() => {{ {VISIBLE_FN} const els = {}; const el = els.find(visible); \
         return {{ count: els.length, visible: el ? {{ tag_name: el.tagName.toLowerCase(), \
         text: (el.innerText || el.textContent || '').trim(), visible: true }} : null }}; }})()",
        locator.to_collect_query()
    )
}

/// Script running `body` against the `nth` match bound as `el`
#[must_use]
pub fn element_script(locator: &LocatorSpec, body: &str, only_visible: bool, nth: usize) -> String {
    let filter = if only_visible { ".filter(visible)" } else { "" };
    format!(
        "(() => {{ {VISIBLE_FN} const el = {}{filter}[{nth}]; if (!el) return false; {body} return true; }})()",
        locator.to_collect_query()
    )
}

/// Script checking that the `nth` visible match receives a pointer event at (`x`, `y`)
#[must_use]
pub fn hit_test_script(locator: &LocatorSpec, nth: usize, x: f64, y: f64) -> String {
    format!(
        "(() => {{ {VISIBLE_FN} const el = {}.filter(visible)[{nth}]; \
         const top = document.elementFromPoint({x}, {y}); \
         return !!el && !!top && (el === top || el.contains(top)); }})()",
        locator.to_collect_query()
    )
}
