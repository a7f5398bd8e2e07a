//! Mock page for unit testing.
//!
//! `MockPage` is a scriptable in-memory page: elements are declared with the
//! locators that match them, their visibility, attributes and click effects.
//! Every call is recorded in a history for verification. Waits that cannot be
//! satisfied sleep for the full timeout through `tokio::time`, so tests run
//! with paused time observe the same latency bounds as a real engine.

use crate::driver::{
    ClickOptions, ElementInfo, LoadState, PageDriver, PopupWaiter, Probe, ResponseWaiter,
};
use crate::locator::LocatorSpec;
use crate::result::{ResoluteError, ResoluteResult};
use crate::session::StorageState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Side effect of clicking a mock element
#[derive(Clone)]
pub enum MockEffect {
    /// Set an attribute on the clicked element
    SetAttribute {
        /// Attribute name
        name: String,
        /// New value
        value: String,
    },
    /// Open a popup, delivered to listeners registered before the click
    OpenPopup(Arc<MockPage>),
    /// Make elements matching `locator` on `page` visible
    Reveal {
        /// Page holding the elements
        page: Arc<MockPage>,
        /// Locator to reveal
        locator: LocatorSpec,
    },
    /// Make elements matching `locator` on the clicked page visible
    RevealHere(LocatorSpec),
    /// Hide elements matching `locator` on the clicked page
    HideHere(LocatorSpec),
    /// Close the clicked page
    ClosePage,
    /// Change the URL of the clicked page
    Navigate(String),
    /// Deliver a JSON response to listeners on `page`
    Respond {
        /// Page whose response listeners receive the body
        page: Arc<MockPage>,
        /// Response URL
        url: String,
        /// JSON body
        body: serde_json::Value,
    },
}

impl std::fmt::Debug for MockEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetAttribute { name, value } => write!(f, "SetAttribute({name}={value})"),
            Self::OpenPopup(_) => write!(f, "OpenPopup"),
            Self::Reveal { locator, .. } => write!(f, "Reveal({locator})"),
            Self::RevealHere(l) => write!(f, "RevealHere({l})"),
            Self::HideHere(l) => write!(f, "HideHere({l})"),
            Self::ClosePage => write!(f, "ClosePage"),
            Self::Navigate(u) => write!(f, "Navigate({u})"),
            Self::Respond { url, .. } => write!(f, "Respond({url})"),
        }
    }
}

/// A mock DOM element
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    /// Locators that match this element directly
    pub matches: Vec<LocatorSpec>,
    /// Tag name
    pub tag_name: String,
    /// Text content
    pub text: String,
    /// Whether the element is rendered
    pub visible: bool,
    /// Probes that miss before the element shows up
    pub appears_after: u32,
    /// Clicks rejected before one succeeds
    pub click_failures: u32,
    /// Attributes
    pub attributes: HashMap<String, String>,
    /// Current input value
    pub value: String,
    /// Effects applied on successful click
    pub on_click: Vec<MockEffect>,
}

impl MockElement {
    /// Create a visible element matched by `locator`
    #[must_use]
    pub fn new(locator: impl Into<LocatorSpec>) -> Self {
        Self {
            matches: vec![locator.into()],
            tag_name: "div".to_string(),
            visible: true,
            ..Self::default()
        }
    }

    /// Add another matching locator
    #[must_use]
    pub fn also(mut self, locator: impl Into<LocatorSpec>) -> Self {
        self.matches.push(locator.into());
        self
    }

    /// Set tag name
    #[must_use]
    pub fn tag(mut self, tag: &str) -> Self {
        self.tag_name = tag.to_string();
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Mark hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Show up only after `probes` missed probes
    #[must_use]
    pub const fn appears_after(mut self, probes: u32) -> Self {
        self.appears_after = probes;
        self
    }

    /// Reject the first `n` clicks
    #[must_use]
    pub const fn failing_clicks(mut self, n: u32) -> Self {
        self.click_failures = n;
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        let _ = self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the initial input value
    #[must_use]
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    /// Add a click effect
    #[must_use]
    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn is_match(&self, locator: &LocatorSpec) -> bool {
        if self.matches.contains(locator) {
            return true;
        }
        match locator {
            LocatorSpec::CssWithText { css, text } => {
                self.matches.contains(&LocatorSpec::css(css.clone())) && self.text.contains(text)
            }
            LocatorSpec::Role { role, name } if !name.is_empty() => {
                self.matches.contains(&LocatorSpec::role(role.clone(), ""))
                    && self.text.contains(name)
            }
            LocatorSpec::Text { text } => !text.is_empty() && self.text.contains(text),
            _ => false,
        }
    }

    fn info(&self) -> ElementInfo {
        ElementInfo {
            tag_name: self.tag_name.clone(),
            text: self.text.clone(),
            visible: self.visible,
        }
    }
}

#[derive(Default)]
struct MockState {
    url: String,
    elements: Vec<MockElement>,
    history: Vec<String>,
    popup_waiters: Vec<oneshot::Sender<Arc<dyn PageDriver>>>,
    response_waiters: Vec<(String, oneshot::Sender<serde_json::Value>)>,
    eval_results: Vec<(String, serde_json::Value)>,
    failures: HashMap<String, u32>,
    storage: StorageState,
    closed: bool,
}

/// Mock page for unit testing
pub struct MockPage {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockPage")
            .field("url", &state.url)
            .field("elements", &state.elements.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new("about:blank")
    }
}

impl MockPage {
    /// Create a page at `url`
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                url: url.to_string(),
                ..MockState::default()
            }),
        }
    }

    /// Create a shared page
    #[must_use]
    pub fn shared(url: &str) -> Arc<Self> {
        Arc::new(Self::new(url))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(state: &mut MockState, call: String) {
        state.history.push(call);
    }

    fn injected_failure(state: &mut MockState, op: &str) -> ResoluteResult<()> {
        if let Some(left) = state.failures.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(ResoluteError::page(format!("injected {op} failure")));
            }
        }
        Ok(())
    }

    /// Add an element
    pub fn add_element(&self, element: MockElement) {
        self.lock().elements.push(element);
    }

    /// Builder form of [`Self::add_element`]
    #[must_use]
    pub fn with_element(self, element: MockElement) -> Self {
        self.add_element(element);
        self
    }

    /// Make the next `times` calls of operation `op` fail
    pub fn fail_next(&self, op: &str, times: u32) {
        let _ = self.lock().failures.insert(op.to_string(), times);
    }

    /// Return `value` from `evaluate` for scripts containing `needle`
    pub fn set_eval_result(&self, needle: &str, value: serde_json::Value) {
        self.lock()
            .eval_results
            .push((needle.to_string(), value));
    }

    /// Seed storage state
    pub fn set_storage(&self, state: StorageState) {
        self.lock().storage = state;
    }

    /// Make matches of `locator` visible
    pub fn reveal(&self, locator: &LocatorSpec) {
        let mut state = self.lock();
        for el in state.elements.iter_mut().filter(|e| e.is_match(locator)) {
            el.visible = true;
            el.appears_after = 0;
        }
    }

    /// Hide matches of `locator`
    pub fn hide(&self, locator: &LocatorSpec) {
        let mut state = self.lock();
        for el in state.elements.iter_mut().filter(|e| e.is_match(locator)) {
            el.visible = false;
        }
    }

    /// Close the page
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Whether the page is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Current URL
    #[must_use]
    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    /// Attribute of the first match
    #[must_use]
    pub fn attribute_of(&self, locator: &LocatorSpec, name: &str) -> Option<String> {
        self.lock()
            .elements
            .iter()
            .find(|e| e.is_match(locator))
            .and_then(|e| e.attributes.get(name).cloned())
    }

    /// Input value of the first match
    #[must_use]
    pub fn value_of(&self, locator: &LocatorSpec) -> Option<String> {
        self.lock()
            .elements
            .iter()
            .find(|e| e.is_match(locator))
            .map(|e| e.value.clone())
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Check if a call starting with `prefix` was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.lock().history.iter().any(|c| c.starts_with(prefix))
    }

    /// Count calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn deliver_response(&self, url: &str, body: &serde_json::Value) {
        let mut state = self.lock();
        let waiters = std::mem::take(&mut state.response_waiters);
        for (fragment, tx) in waiters {
            if url.contains(&fragment) {
                let _ = tx.send(body.clone());
            } else {
                state.response_waiters.push((fragment, tx));
            }
        }
    }

    fn apply_effects(&self, index: usize, effects: Vec<MockEffect>) {
        for effect in effects {
            match effect {
                MockEffect::SetAttribute { name, value } => {
                    let mut state = self.lock();
                    if let Some(el) = state.elements.get_mut(index) {
                        let _ = el.attributes.insert(name, value);
                    }
                }
                MockEffect::OpenPopup(popup) => {
                    let mut state = self.lock();
                    let waiters = std::mem::take(&mut state.popup_waiters);
                    if waiters.is_empty() {
                        Self::record(&mut state, "popup_missed".to_string());
                    }
                    drop(state);
                    for tx in waiters {
                        let page: Arc<dyn PageDriver> = popup.clone();
                        let _ = tx.send(page);
                    }
                }
                MockEffect::Reveal { page, locator } => page.reveal(&locator),
                MockEffect::RevealHere(locator) => self.reveal(&locator),
                MockEffect::HideHere(locator) => self.hide(&locator),
                MockEffect::ClosePage => self.close(),
                MockEffect::Navigate(url) => self.lock().url = url,
                MockEffect::Respond { page, url, body } => page.deliver_response(&url, &body),
            }
        }
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(
        &self,
        url: &str,
        _wait_until: LoadState,
        _timeout: Duration,
    ) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("goto:{url}"));
        Self::injected_failure(&mut state, "goto").map_err(|e| ResoluteError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> ResoluteResult<String> {
        Ok(self.url())
    }

    async fn wait_for_visible(
        &self,
        locator: &LocatorSpec,
        timeout: Duration,
    ) -> ResoluteResult<Probe> {
        let hidden = {
            let mut state = self.lock();
            Self::record(&mut state, format!("wait_for_visible:{locator}"));
            Self::injected_failure(&mut state, "wait_for_visible")?;
            if state.closed {
                return Err(ResoluteError::PageClosed);
            }

            let mut visible = None;
            let mut hidden = 0;
            for el in state.elements.iter_mut().filter(|e| e.is_match(locator)) {
                if el.appears_after > 0 {
                    el.appears_after -= 1;
                    hidden += 1;
                } else if el.visible {
                    if visible.is_none() {
                        visible = Some(el.info());
                    }
                } else {
                    hidden += 1;
                }
            }
            if let Some(info) = visible {
                return Ok(Probe::Visible(info));
            }
            hidden
        };

        tokio::time::sleep(timeout).await;
        Ok(if hidden > 0 {
            Probe::Hidden { count: hidden }
        } else {
            Probe::Absent
        })
    }

    async fn texts(&self, locator: &LocatorSpec) -> ResoluteResult<Vec<String>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("texts:{locator}"));
        Ok(state
            .elements
            .iter()
            .filter(|e| e.visible && e.is_match(locator))
            .map(|e| e.text.clone())
            .collect())
    }

    async fn attribute(
        &self,
        locator: &LocatorSpec,
        name: &str,
    ) -> ResoluteResult<Option<String>> {
        let mut state = self.lock();
        Self::record(&mut state, format!("attribute:{locator}:{name}"));
        Ok(state
            .elements
            .iter()
            .find(|e| e.is_match(locator))
            .and_then(|e| e.attributes.get(name).cloned()))
    }

    async fn scroll_into_view(&self, locator: &LocatorSpec) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("scroll_into_view:{locator}"));
        Self::injected_failure(&mut state, "scroll_into_view")
    }

    async fn click(&self, locator: &LocatorSpec, options: ClickOptions) -> ResoluteResult<()> {
        let (index, effects) = {
            let mut state = self.lock();
            let force = if options.force { ":force" } else { "" };
            let nth = if options.nth > 0 {
                format!("#{}", options.nth)
            } else {
                String::new()
            };
            Self::record(&mut state, format!("click:{locator}{force}{nth}"));
            if state.closed {
                return Err(ResoluteError::PageClosed);
            }
            Self::injected_failure(&mut state, "click")?;

            let index = state
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.visible && e.appears_after == 0 && e.is_match(locator))
                .map(|(i, _)| i)
                .nth(options.nth)
                .ok_or_else(|| {
                    ResoluteError::interaction(locator.to_string(), "no visible element")
                })?;

            let el = &mut state.elements[index];
            if el.click_failures > 0 {
                el.click_failures -= 1;
                return Err(ResoluteError::interaction(
                    locator.to_string(),
                    "click intercepted",
                ));
            }
            (index, el.on_click.clone())
        };

        self.apply_effects(index, effects);
        Ok(())
    }

    async fn clear(&self, locator: &LocatorSpec) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("clear:{locator}"));
        let el = state
            .elements
            .iter_mut()
            .find(|e| e.is_match(locator))
            .ok_or_else(|| ResoluteError::interaction(locator.to_string(), "no element"))?;
        el.value.clear();
        Ok(())
    }

    async fn fill(&self, locator: &LocatorSpec, text: &str) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("fill:{locator}"));
        Self::injected_failure(&mut state, "fill")?;
        let el = state
            .elements
            .iter_mut()
            .find(|e| e.visible && e.is_match(locator))
            .ok_or_else(|| ResoluteError::interaction(locator.to_string(), "no element"))?;
        // typing appends, like a real input that was not cleared
        el.value.push_str(text);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> ResoluteResult<serde_json::Value> {
        let mut state = self.lock();
        Self::record(&mut state, format!("evaluate:{script}"));
        Self::injected_failure(&mut state, "evaluate")?;
        Ok(state
            .eval_results
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        _timeout: Duration,
    ) -> ResoluteResult<()> {
        let mut inner = self.lock();
        Self::record(&mut inner, format!("wait_for_load_state:{state}"));
        Self::injected_failure(&mut inner, "wait_for_load_state")
    }

    async fn screenshot(&self, path: &Path) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("screenshot:{}", path.display()));
        Self::injected_failure(&mut state, "screenshot")
    }

    async fn set_input_files(
        &self,
        locator: &LocatorSpec,
        files: &[PathBuf],
    ) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, format!("set_input_files:{locator}:{}", files.len()));
        let el = state
            .elements
            .iter_mut()
            .find(|e| e.is_match(locator))
            .ok_or_else(|| ResoluteError::interaction(locator.to_string(), "no file input"))?;
        el.value = files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Ok(())
    }

    async fn expect_popup(&self) -> ResoluteResult<PopupWaiter> {
        let mut state = self.lock();
        Self::record(&mut state, "expect_popup".to_string());
        Self::injected_failure(&mut state, "expect_popup")?;
        let (tx, rx) = oneshot::channel();
        state.popup_waiters.push(tx);
        Ok(PopupWaiter::new(rx))
    }

    async fn expect_response(&self, url_fragment: &str) -> ResoluteResult<ResponseWaiter> {
        let mut state = self.lock();
        Self::record(&mut state, format!("expect_response:{url_fragment}"));
        let (tx, rx) = oneshot::channel();
        state.response_waiters.push((url_fragment.to_string(), tx));
        Ok(ResponseWaiter::new(url_fragment, rx))
    }

    async fn wait_for_close(&self, timeout: Duration) -> ResoluteResult<bool> {
        {
            let mut state = self.lock();
            Self::record(&mut state, "wait_for_close".to_string());
            if state.closed {
                return Ok(true);
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(self.is_closed())
    }

    async fn storage_state(&self) -> ResoluteResult<StorageState> {
        let mut state = self.lock();
        Self::record(&mut state, "storage_state".to_string());
        Ok(state.storage.clone())
    }

    async fn apply_storage_state(&self, storage: &StorageState) -> ResoluteResult<()> {
        let mut state = self.lock();
        Self::record(&mut state, "apply_storage_state".to_string());
        state.storage = storage.clone();
        Ok(())
    }
}
