//! Locator resolution across candidate lists.
//!
//! Candidates are probed strictly in order with a short per-candidate wait;
//! the first visible match wins. When no candidate resolves, an
//! [`Affordance`] can escalate to a raw in-page click and finally to direct
//! navigation, which is only accepted once a verification indicator shows up.

use crate::driver::{ClickOptions, ElementInfo, LoadState, PageDriver, Probe};
use crate::locator::LocatorSpec;
use crate::result::ResoluteResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-candidate visibility wait
pub const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Marker embedded in the raw click script
pub const SCRIPT_CLICK_MARKER: &str = "/*resolute:script-click*/";

/// A candidate that resolved to a visible element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    /// Index of the winning candidate
    pub index: usize,
    /// The winning candidate
    pub locator: LocatorSpec,
    /// Snapshot of the element
    pub element: ElementInfo,
}

/// Outcome of resolving a candidate list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First visible match
    Found(ResolvedElement),
    /// Some candidates matched elements, none of them visible
    NotVisible {
        /// Indices of candidates with hidden matches
        matched: Vec<usize>,
    },
    /// Nothing matched at all
    NotFound,
}

impl Resolution {
    /// Whether a visible match was found
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The resolved element, if any
    #[must_use]
    pub const fn found(&self) -> Option<&ResolvedElement> {
        match self {
            Self::Found(el) => Some(el),
            _ => None,
        }
    }
}

/// What to do with a resolved element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    /// Forced click
    Click,
    /// Only wait for visibility
    WaitFor,
    /// Only report visibility
    IsVisible,
}

/// Navigation fallback that must be confirmed by an indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFallback {
    /// Absolute URL to navigate to
    pub url: String,
    /// Indicators proving the navigation landed; at least one must be visible
    pub verify: Vec<LocatorSpec>,
}

impl UrlFallback {
    /// Create a fallback
    #[must_use]
    pub fn new(url: impl Into<String>, verify: Vec<LocatorSpec>) -> Self {
        Self {
            url: url.into(),
            verify,
        }
    }
}

/// A logical UI affordance with its escalation chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    /// Human name, used in logs
    pub name: String,
    /// Ordered locator candidates
    pub candidates: Vec<LocatorSpec>,
    /// Raw CSS queries for the in-page click
    #[serde(default)]
    pub script_queries: Vec<String>,
    /// Verified navigation fallback
    #[serde(default)]
    pub url_fallback: Option<UrlFallback>,
}

impl Affordance {
    /// Create an affordance from candidates
    #[must_use]
    pub fn new(name: impl Into<String>, candidates: Vec<LocatorSpec>) -> Self {
        Self {
            name: name.into(),
            candidates,
            script_queries: Vec::new(),
            url_fallback: None,
        }
    }

    /// Add raw queries for the in-page click
    #[must_use]
    pub fn with_script_queries<S: Into<String>>(mut self, queries: impl IntoIterator<Item = S>) -> Self {
        self.script_queries = queries.into_iter().map(Into::into).collect();
        self
    }

    /// Add a verified URL fallback
    #[must_use]
    pub fn with_url_fallback(mut self, fallback: UrlFallback) -> Self {
        self.url_fallback = Some(fallback);
        self
    }
}

/// How an affordance was activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A candidate resolved and was clicked
    Clicked(ResolvedElement),
    /// The in-page click hit the query at this index
    ScriptClicked {
        /// Index into `script_queries`
        query_index: usize,
    },
    /// Navigation landed and was verified
    Navigated {
        /// URL navigated to
        url: String,
    },
    /// Every strategy failed
    NotFound,
}

impl Activation {
    /// Whether any strategy succeeded
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Sequential candidate resolver
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    timeout: Duration,
    navigation_timeout: Duration,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with the default per-candidate timeout
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_CANDIDATE_TIMEOUT,
            navigation_timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-candidate timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout for the URL fallback navigation
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Per-candidate timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Worst-case time spent probing `n` absent candidates
    #[must_use]
    pub fn worst_case(&self, n: usize) -> Duration {
        self.timeout * u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Probe candidates in order and return the first visible match
    pub async fn resolve(&self, page: &dyn PageDriver, candidates: &[LocatorSpec]) -> Resolution {
        let mut matched = Vec::new();

        for (index, locator) in candidates.iter().enumerate() {
            match page.wait_for_visible(locator, self.timeout).await {
                Ok(Probe::Visible(element)) => {
                    debug!(index, %locator, "candidate resolved");
                    return Resolution::Found(ResolvedElement {
                        index,
                        locator: locator.clone(),
                        element,
                    });
                }
                Ok(Probe::Hidden { count }) => {
                    debug!(index, %locator, count, "candidate matched but not visible");
                    matched.push(index);
                }
                Ok(Probe::Absent) => debug!(index, %locator, "candidate absent"),
                Err(e) => warn!(index, %locator, error = %e, "candidate probe failed"),
            }
        }

        if matched.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::NotVisible { matched }
        }
    }

    /// Resolve, then perform `action` on the winner
    pub async fn resolve_and_act(
        &self,
        page: &dyn PageDriver,
        candidates: &[LocatorSpec],
        action: ResolveAction,
    ) -> ResoluteResult<Resolution> {
        let resolution = self.resolve(page, candidates).await;
        if let (ResolveAction::Click, Resolution::Found(found)) = (action, &resolution) {
            page.click(&found.locator, ClickOptions::forced()).await?;
        }
        Ok(resolution)
    }

    /// Run candidates, then the in-page click, then the verified URL fallback
    pub async fn activate(
        &self,
        page: &dyn PageDriver,
        affordance: &Affordance,
    ) -> ResoluteResult<Activation> {
        match self
            .resolve_and_act(page, &affordance.candidates, ResolveAction::Click)
            .await
        {
            Ok(Resolution::Found(found)) => {
                info!(affordance = %affordance.name, index = found.index, "activated by locator");
                return Ok(Activation::Clicked(found));
            }
            Ok(_) => {}
            Err(e) => warn!(affordance = %affordance.name, error = %e, "click on resolved candidate failed"),
        }

        if !affordance.script_queries.is_empty() {
            match script_click(page, &affordance.script_queries).await {
                Ok(Some(query_index)) => {
                    info!(affordance = %affordance.name, query_index, "activated by script click");
                    return Ok(Activation::ScriptClicked { query_index });
                }
                Ok(None) => debug!(affordance = %affordance.name, "script click found nothing"),
                Err(e) => warn!(affordance = %affordance.name, error = %e, "script click failed"),
            }
        }

        if let Some(fallback) = &affordance.url_fallback {
            if self.navigate_verified(page, fallback).await {
                info!(affordance = %affordance.name, url = %fallback.url, "activated by navigation");
                return Ok(Activation::Navigated {
                    url: fallback.url.clone(),
                });
            }
        }

        warn!(affordance = %affordance.name, "affordance not found");
        Ok(Activation::NotFound)
    }

    /// Navigate to the fallback URL and require a visible indicator
    pub async fn navigate_verified(&self, page: &dyn PageDriver, fallback: &UrlFallback) -> bool {
        if fallback.verify.is_empty() {
            warn!(url = %fallback.url, "url fallback has no verification indicators; skipped");
            return false;
        }
        if let Err(e) = page
            .goto(&fallback.url, LoadState::DomContentLoaded, self.navigation_timeout)
            .await
        {
            warn!(url = %fallback.url, error = %e, "url fallback navigation failed");
            return false;
        }
        let verified = self.resolve(page, &fallback.verify).await.is_found();
        if !verified {
            warn!(url = %fallback.url, "url fallback landed without a visible indicator");
        }
        verified
    }
}

/// Build the raw in-page click script for `queries`
#[must_use]
pub fn script_click_source(queries: &[String]) -> String {
    let list = serde_json::to_string(queries).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{SCRIPT_CLICK_MARKER}(() => {{ const qs = {list}; \
         for (let i = 0; i < qs.length; i++) {{ let el = null; \
         try {{ el = document.querySelector(qs[i]); }} catch (e) {{}} \
         if (el) {{ el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }})); return i; }} }} \
         return -1; }})()"
    )
}

/// Dispatch a synthetic click on the first raw query that matches.
///
/// Returns the index of the query that was clicked.
pub async fn script_click(
    page: &dyn PageDriver,
    queries: &[String],
) -> ResoluteResult<Option<usize>> {
    let value = page.evaluate(&script_click_source(queries)).await?;
    Ok(value
        .as_i64()
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < queries.len()))
}
