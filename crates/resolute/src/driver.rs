//! PageDriver - the browser engine seam.
//!
//! Everything above this trait (resolution, actions, login flows, page
//! objects) is engine-agnostic. The engine owns every wait: implementations
//! must honour the timeouts passed in and report "not there yet" as a value,
//! not as an error.
//!
//! # Implementations
//!
//! - [`crate::mock::MockPage`] - scriptable in-memory page for unit tests
//! - `ChromiumPage` - CDP via chromiumoxide (`browser` feature)

use crate::locator::LocatorSpec;
use crate::result::{ResoluteError, ResoluteResult};
use crate::session::StorageState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Page load states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// The `load` event fired
    #[default]
    Load,
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// No network activity for 500ms
    NetworkIdle,
}

impl LoadState {
    /// Get the event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// Snapshot of a matched element
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Tag name, lower case
    pub tag_name: String,
    /// Visible text
    pub text: String,
    /// Whether the element is rendered and visible
    pub visible: bool,
}

impl ElementInfo {
    /// Create a visible element snapshot
    #[must_use]
    pub fn visible(tag_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            text: text.into(),
            visible: true,
        }
    }
}

/// Outcome of waiting for a locator to become visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A visible match appeared within the timeout
    Visible(ElementInfo),
    /// Matches exist but none became visible
    Hidden {
        /// Number of non-visible matches
        count: usize,
    },
    /// Nothing matched
    Absent,
}

impl Probe {
    /// Whether a visible match was found
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        matches!(self, Self::Visible(_))
    }
}

/// Click options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickOptions {
    /// Bypass the engine's occlusion / hit-testing checks
    pub force: bool,
    /// Click the n-th match instead of the first
    pub nth: usize,
}

impl ClickOptions {
    /// Forced click on the first match
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true, nth: 0 }
    }

    /// Target the n-th match
    #[must_use]
    pub const fn with_nth(mut self, nth: usize) -> Self {
        self.nth = nth;
        self
    }
}

/// Background task feeding a waiter; aborted when the waiter goes away
#[derive(Debug, Default)]
struct ListenerTask(Option<AbortHandle>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Listener for a page opened by a later action.
///
/// Obtain it with [`PageDriver::expect_popup`] *before* performing the click
/// that opens the popup; a popup opened before registration is missed.
#[derive(Debug)]
pub struct PopupWaiter {
    rx: oneshot::Receiver<Arc<dyn PageDriver>>,
    task: ListenerTask,
}

impl PopupWaiter {
    /// Wrap a receiver fed by the engine
    #[must_use]
    pub const fn new(rx: oneshot::Receiver<Arc<dyn PageDriver>>) -> Self {
        Self {
            rx,
            task: ListenerTask(None),
        }
    }

    /// Abort `task` once this waiter resolves, times out or is dropped
    #[must_use]
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = ListenerTask(Some(task));
        self
    }

    /// Wait for the popup
    pub async fn wait(self, timeout: Duration) -> ResoluteResult<Arc<dyn PageDriver>> {
        let Self { rx, task } = self;
        let outcome = tokio::time::timeout(timeout, rx).await;
        drop(task);
        match outcome {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(_)) => Err(ResoluteError::page("popup listener dropped")),
            Err(_) => Err(ResoluteError::timeout(
                timeout.as_millis() as u64,
                "new page",
            )),
        }
    }
}

/// Listener for a JSON network response
#[derive(Debug)]
pub struct ResponseWaiter {
    url_fragment: String,
    rx: oneshot::Receiver<serde_json::Value>,
    task: ListenerTask,
}

impl ResponseWaiter {
    /// Wrap a receiver fed by the engine
    #[must_use]
    pub fn new(url_fragment: impl Into<String>, rx: oneshot::Receiver<serde_json::Value>) -> Self {
        Self {
            url_fragment: url_fragment.into(),
            rx,
            task: ListenerTask(None),
        }
    }

    /// Abort `task` when this waiter is dropped
    #[must_use]
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = ListenerTask(Some(task));
        self
    }

    /// URL fragment this waiter listens for
    #[must_use]
    pub fn url_fragment(&self) -> &str {
        &self.url_fragment
    }

    /// Take the response if it already arrived
    pub fn try_take(&mut self) -> Option<serde_json::Value> {
        self.rx.try_recv().ok()
    }
}

/// Abstract page trait for browser automation
#[async_trait]
pub trait PageDriver: Send + Sync + std::fmt::Debug {
    /// Navigate to URL and wait for a load state
    async fn goto(&self, url: &str, wait_until: LoadState, timeout: Duration)
        -> ResoluteResult<()>;

    /// Get current URL
    async fn current_url(&self) -> ResoluteResult<String>;

    /// Wait up to `timeout` for a visible match
    async fn wait_for_visible(
        &self,
        locator: &LocatorSpec,
        timeout: Duration,
    ) -> ResoluteResult<Probe>;

    /// Text of every match in DOM order
    async fn texts(&self, locator: &LocatorSpec) -> ResoluteResult<Vec<String>>;

    /// Attribute of the first match (`None` when absent)
    async fn attribute(&self, locator: &LocatorSpec, name: &str)
        -> ResoluteResult<Option<String>>;

    /// Scroll the first match into view
    async fn scroll_into_view(&self, locator: &LocatorSpec) -> ResoluteResult<()>;

    /// Click a match
    async fn click(&self, locator: &LocatorSpec, options: ClickOptions) -> ResoluteResult<()>;

    /// Clear an input
    async fn clear(&self, locator: &LocatorSpec) -> ResoluteResult<()>;

    /// Type text into an input
    async fn fill(&self, locator: &LocatorSpec, text: &str) -> ResoluteResult<()>;

    /// Evaluate a script in page context
    async fn evaluate(&self, script: &str) -> ResoluteResult<serde_json::Value>;

    /// Wait for a load state
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration)
        -> ResoluteResult<()>;

    /// Write a PNG screenshot
    async fn screenshot(&self, path: &Path) -> ResoluteResult<()>;

    /// Hand files to a file input
    async fn set_input_files(&self, locator: &LocatorSpec, files: &[PathBuf])
        -> ResoluteResult<()>;

    /// Register a listener for the next page opened from this one
    async fn expect_popup(&self) -> ResoluteResult<PopupWaiter>;

    /// Register a listener for the next JSON response whose URL contains `url_fragment`
    async fn expect_response(&self, url_fragment: &str) -> ResoluteResult<ResponseWaiter>;

    /// Wait for this page to close; `false` on timeout
    async fn wait_for_close(&self, timeout: Duration) -> ResoluteResult<bool>;

    /// Dump cookies and local storage
    async fn storage_state(&self) -> ResoluteResult<StorageState>;

    /// Seed cookies and local storage
    async fn apply_storage_state(&self, state: &StorageState) -> ResoluteResult<()>;
}
