//! Retrying action primitives.
//!
//! Each primitive makes exactly `max_attempts` attempts. An attempt first
//! checks visibility with a short wait, then scrolls, settles and performs a
//! forced interaction. Exhaustion captures a diagnostic screenshot and
//! returns an [`ActionError`]; nothing here panics.

use crate::backoff::RetryPolicy;
use crate::driver::{ClickOptions, PageDriver, Probe};
use crate::evidence::ArtifactDirs;
use crate::locator::LocatorSpec;
use crate::resolve::{Resolution, Resolver};
use crate::result::ResoluteError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why an action attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reason {
    /// No element matched
    #[error("element not found")]
    NotFound,
    /// Matches exist but none is visible
    #[error("element found but not actionable")]
    NotActionable,
    /// The engine rejected the interaction
    #[error("{0}")]
    Unexpected(String),
}

impl From<&ResoluteError> for Reason {
    fn from(err: &ResoluteError) -> Self {
        Self::Unexpected(err.to_string())
    }
}

/// A primitive that gave up
#[derive(Debug, Clone, Error)]
#[error("{action} on {target} failed after {attempts} attempts: {reason}")]
pub struct ActionError {
    /// Primitive name
    pub action: &'static str,
    /// Locator description
    pub target: String,
    /// Reason of the last attempt
    pub reason: Reason,
    /// Attempts made
    pub attempts: u32,
    /// Diagnostic screenshot, when one could be taken
    pub screenshot: Option<PathBuf>,
}

/// A primitive that succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    /// Locator that was acted on
    pub locator: LocatorSpec,
    /// Attempt that succeeded (1-based)
    pub attempts: u32,
    /// Winning candidate index for candidate-list primitives
    pub candidate: Option<usize>,
}

/// Result of an action primitive
pub type ActionResult = Result<ActionReport, ActionError>;

/// Downgrade to the boolean used by page objects
pub trait ActionResultExt {
    /// `true` on success; failures are logged
    fn passed(&self) -> bool;
}

impl ActionResultExt for ActionResult {
    fn passed(&self) -> bool {
        match self {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "action failed");
                false
            }
        }
    }
}

/// State-change detection around a click
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToggleOutcome {
    /// Whether the control was found, clicked or not
    pub found: bool,
    /// Whether the observed attribute changed
    pub changed: bool,
    /// Attribute before the click
    pub before: Option<String>,
    /// Attribute after the click
    pub after: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Op<'a> {
    Click,
    Fill(&'a str),
    Upload(&'a [PathBuf]),
}

impl Op<'_> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill(_) => "fill",
            Self::Upload(_) => "upload",
        }
    }

    const fn needs_visible(&self) -> bool {
        !matches!(self, Self::Upload(_))
    }
}

/// Retrying action primitives
#[derive(Debug, Clone)]
pub struct Actions {
    retry: RetryPolicy,
    visibility_timeout: Duration,
    settle: Duration,
    resolver: Resolver,
    artifacts: Option<ArtifactDirs>,
}

impl Default for Actions {
    fn default() -> Self {
        Self::new(RetryPolicy::actions())
    }
}

impl Actions {
    /// Default visibility wait per attempt
    pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default pause between scroll and click
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

    /// Primitives with the given retry policy
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            visibility_timeout: Self::DEFAULT_VISIBILITY_TIMEOUT,
            settle: Self::DEFAULT_SETTLE,
            resolver: Resolver::new(),
            artifacts: None,
        }
    }

    /// Set the per-attempt visibility wait
    #[must_use]
    pub const fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the resolver used by candidate-list primitives
    #[must_use]
    pub const fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Capture failure screenshots under `artifacts`
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: ArtifactDirs) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Retry policy
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolver
    #[must_use]
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Click `locator`
    pub async fn click(&self, page: &dyn PageDriver, locator: &LocatorSpec) -> ActionResult {
        self.run(page, locator, Op::Click).await
    }

    /// Clear `locator`, then type `text`
    pub async fn fill(&self, page: &dyn PageDriver, locator: &LocatorSpec, text: &str) -> ActionResult {
        self.run(page, locator, Op::Fill(text)).await
    }

    /// Hand files to a (possibly hidden) file input
    pub async fn upload(
        &self,
        page: &dyn PageDriver,
        locator: &LocatorSpec,
        files: &[PathBuf],
    ) -> ActionResult {
        self.run(page, locator, Op::Upload(files)).await
    }

    /// Whether `locator` becomes visible within the visibility timeout
    pub async fn is_visible(&self, page: &dyn PageDriver, locator: &LocatorSpec) -> bool {
        matches!(
            page.wait_for_visible(locator, self.visibility_timeout).await,
            Ok(Probe::Visible(_))
        )
    }

    /// Resolve `candidates`, then click the winner
    pub async fn click_any(&self, page: &dyn PageDriver, candidates: &[LocatorSpec]) -> ActionResult {
        self.run_any(page, candidates, Op::Click).await
    }

    /// Resolve `candidates`, then clear and fill the winner
    pub async fn fill_any(
        &self,
        page: &dyn PageDriver,
        candidates: &[LocatorSpec],
        text: &str,
    ) -> ActionResult {
        self.run_any(page, candidates, Op::Fill(text)).await
    }

    async fn run_any(&self, page: &dyn PageDriver, candidates: &[LocatorSpec], op: Op<'_>) -> ActionResult {
        let target = describe(candidates);
        let attempts = self.retry.attempts();
        let mut reason = Reason::NotFound;

        for attempt in 1..=attempts {
            match self.resolver.resolve(page, candidates).await {
                Resolution::Found(found) => match self.interact(page, &found.locator, op).await {
                    Ok(()) => {
                        info!(candidates = %target, index = found.index, action = op.name(), attempt, "acted on candidate");
                        return Ok(ActionReport {
                            locator: found.locator,
                            attempts: attempt,
                            candidate: Some(found.index),
                        });
                    }
                    Err(e) => reason = Reason::from(&e),
                },
                Resolution::NotVisible { .. } => reason = Reason::NotActionable,
                Resolution::NotFound => reason = Reason::NotFound,
            }
            debug!(candidates = %target, action = op.name(), attempt, %reason, "attempt failed");
            if let Some(delay) = self.retry.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(self.exhausted(page, op.name(), target, reason, attempts).await)
    }

    /// Click `locator` and report whether `attribute` changed
    pub async fn toggle(&self, page: &dyn PageDriver, locator: &LocatorSpec, attribute: &str) -> ToggleOutcome {
        let before = read_attribute(page, locator, attribute).await;
        if let Err(e) = self.click(page, locator).await {
            return ToggleOutcome {
                found: !matches!(e.reason, Reason::NotFound),
                before,
                ..ToggleOutcome::default()
            };
        }
        tokio::time::sleep(self.settle).await;
        let after = read_attribute(page, locator, attribute).await;
        let changed = before != after;
        debug!(%locator, attribute, ?before, ?after, changed, "toggle observed");
        ToggleOutcome {
            found: true,
            changed,
            before,
            after,
        }
    }

    async fn run(&self, page: &dyn PageDriver, locator: &LocatorSpec, op: Op<'_>) -> ActionResult {
        let attempts = self.retry.attempts();
        let mut reason = Reason::NotFound;

        for attempt in 1..=attempts {
            let probe = if op.needs_visible() {
                page.wait_for_visible(locator, self.visibility_timeout).await
            } else {
                Ok(Probe::Visible(crate::driver::ElementInfo::default()))
            };

            match probe {
                Ok(Probe::Visible(_)) => match self.interact(page, locator, op).await {
                    Ok(()) => {
                        debug!(%locator, action = op.name(), attempt, "action succeeded");
                        return Ok(ActionReport {
                            locator: locator.clone(),
                            attempts: attempt,
                            candidate: None,
                        });
                    }
                    Err(e) => reason = Reason::from(&e),
                },
                Ok(Probe::Hidden { .. }) => reason = Reason::NotActionable,
                Ok(Probe::Absent) => reason = Reason::NotFound,
                Err(e) => reason = Reason::from(&e),
            }

            debug!(%locator, action = op.name(), attempt, %reason, "attempt failed");
            if let Some(delay) = self.retry.delay_after(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(self
            .exhausted(page, op.name(), locator.to_string(), reason, attempts)
            .await)
    }

    async fn interact(&self, page: &dyn PageDriver, locator: &LocatorSpec, op: Op<'_>) -> crate::ResoluteResult<()> {
        match op {
            Op::Click => {
                if let Err(e) = page.scroll_into_view(locator).await {
                    debug!(%locator, error = %e, "scroll into view failed; clicking anyway");
                }
                tokio::time::sleep(self.settle).await;
                page.click(locator, ClickOptions::forced()).await
            }
            Op::Fill(text) => {
                page.clear(locator).await?;
                page.fill(locator, text).await
            }
            Op::Upload(files) => page.set_input_files(locator, files).await,
        }
    }

    async fn exhausted(
        &self,
        page: &dyn PageDriver,
        action: &'static str,
        target: String,
        reason: Reason,
        attempts: u32,
    ) -> ActionError {
        let screenshot = match &self.artifacts {
            Some(dirs) => dirs.capture(page, &format!("{action}-{target}-failed")).await,
            None => None,
        };
        let err = ActionError {
            action,
            target,
            reason,
            attempts,
            screenshot,
        };
        warn!(error = %err, "action exhausted retries");
        err
    }
}

async fn read_attribute(page: &dyn PageDriver, locator: &LocatorSpec, name: &str) -> Option<String> {
    match page.attribute(locator, name).await {
        Ok(v) => v,
        Err(e) => {
            debug!(%locator, attribute = name, error = %e, "attribute read failed");
            None
        }
    }
}

fn describe(candidates: &[LocatorSpec]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}
