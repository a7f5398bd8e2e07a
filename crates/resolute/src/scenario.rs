//! Scenario runner and report.
//!
//! Page objects answer `bool`; this is the only layer that turns a `false`
//! into a failure. Missing configuration becomes a skip, never a failure.

use crate::config::ConfigError;
use crate::driver::PageDriver;
use crate::evidence::{sanitize_name, ArtifactDirs};
use crate::result::ResoluteResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    /// The step ran and its check held
    Passed,
    /// The step ran and its check did not hold
    Failed {
        /// What went wrong
        message: String,
        /// Failure screenshot
        #[serde(
            default,
            rename = "failure_screenshot",
            skip_serializing_if = "Option::is_none"
        )]
        screenshot: Option<PathBuf>,
    },
    /// The step could not run
    Skipped {
        /// Why
        reason: String,
    },
}

impl StepOutcome {
    /// A failure without a screenshot
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            screenshot: None,
        }
    }

    /// A skip
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// `Passed` when `ok`, otherwise a failure with `message`
    #[must_use]
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Self::Passed
        } else {
            Self::fail(message)
        }
    }

    /// Whether the step passed
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Whether the step failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the step was skipped
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

impl From<&ConfigError> for StepOutcome {
    fn from(err: &ConfigError) -> Self {
        if err.is_skip() {
            Self::skip(err.to_string())
        } else {
            Self::fail(err.to_string())
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Values a step may return
pub trait IntoStepOutcome {
    /// Convert into an outcome
    fn into_step_outcome(self) -> StepOutcome;
}

impl IntoStepOutcome for StepOutcome {
    fn into_step_outcome(self) -> StepOutcome {
        self
    }
}

impl IntoStepOutcome for bool {
    fn into_step_outcome(self) -> StepOutcome {
        StepOutcome::check(self, "check returned false")
    }
}

impl<T: IntoStepOutcome> IntoStepOutcome for Result<T, ConfigError> {
    fn into_step_outcome(self) -> StepOutcome {
        match self {
            Ok(v) => v.into_step_outcome(),
            Err(e) => StepOutcome::from(&e),
        }
    }
}

/// A finished step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name
    pub name: String,
    /// Outcome
    #[serde(flatten)]
    pub outcome: StepOutcome,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Screenshot taken after the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

/// Results of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Step results, in order
    pub steps: Vec<StepResult>,
    /// Total wall time in milliseconds
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// No step failed; skips do not count against the scenario
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_failed())
    }

    /// Count passed steps
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_passed()).count()
    }

    /// Count failed steps
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_failed()).count()
    }

    /// Count skipped steps
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_skipped()).count()
    }

    /// Total step count
    #[must_use]
    pub fn total(&self) -> usize {
        self.steps.len()
    }

    /// Failed steps
    #[must_use]
    pub fn failures(&self) -> Vec<&StepResult> {
        self.steps.iter().filter(|s| s.outcome.is_failed()).collect()
    }

    /// Pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> ResoluteResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report to `<dir>/<scenario>.json`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written
    pub fn write_json(&self, dir: &Path) -> ResoluteResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", sanitize_name(&self.scenario)));
        std::fs::write(&path, self.to_json()?)?;
        Ok(path)
    }
}

/// Runs named steps against one page
#[derive(Debug)]
pub struct ScenarioRunner {
    name: String,
    page: Arc<dyn PageDriver>,
    artifacts: Option<ArtifactDirs>,
    step_screenshots: bool,
    fail_fast: bool,
    halted: Option<String>,
    steps: Vec<StepResult>,
    started: Instant,
}

impl ScenarioRunner {
    /// Runner for scenario `name`
    #[must_use]
    pub fn new(name: impl Into<String>, page: Arc<dyn PageDriver>) -> Self {
        Self {
            name: name.into(),
            page,
            artifacts: None,
            step_screenshots: true,
            fail_fast: true,
            halted: None,
            steps: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Capture screenshots under `artifacts`
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: ArtifactDirs) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Only capture screenshots on failure
    #[must_use]
    pub const fn failure_screenshots_only(mut self) -> Self {
        self.step_screenshots = false;
        self
    }

    /// Keep running after a failed step
    #[must_use]
    pub const fn keep_going(mut self) -> Self {
        self.fail_fast = false;
        self
    }

    /// Scenario name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a step; returns whether it passed.
    ///
    /// After a failure (fail-fast) or a skip, remaining steps are skipped
    /// without running.
    pub async fn step<F, Fut, O>(&mut self, name: &str, f: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O>,
        O: IntoStepOutcome,
    {
        if let Some(reason) = &self.halted {
            let outcome = StepOutcome::skip(reason.clone());
            info!(scenario = %self.name, step = name, %outcome, "step not run");
            self.steps.push(StepResult {
                name: name.to_string(),
                outcome,
                duration_ms: 0,
                screenshot: None,
            });
            return false;
        }

        let start = Instant::now();
        let mut outcome = f().await.into_step_outcome();
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let shot_name = format!("{}-{name}", self.name);

        let mut screenshot = None;
        match &mut outcome {
            StepOutcome::Passed => {
                if self.step_screenshots {
                    screenshot = self.capture(&shot_name).await;
                }
                info!(scenario = %self.name, step = name, duration_ms, "step passed");
            }
            StepOutcome::Failed {
                message,
                screenshot: failure_shot,
            } => {
                *failure_shot = self.capture(&format!("{shot_name}-failure")).await;
                warn!(scenario = %self.name, step = name, %message, "step failed");
                if self.fail_fast {
                    self.halted = Some(format!("earlier step '{name}' failed"));
                }
            }
            StepOutcome::Skipped { reason } => {
                info!(scenario = %self.name, step = name, %reason, "step skipped");
                self.halted = Some(reason.clone());
            }
        }

        let passed = outcome.is_passed();
        self.steps.push(StepResult {
            name: name.to_string(),
            outcome,
            duration_ms,
            screenshot,
        });
        passed
    }

    async fn capture(&self, name: &str) -> Option<PathBuf> {
        match &self.artifacts {
            Some(artifacts) => artifacts.capture(self.page.as_ref(), name).await,
            None => None,
        }
    }

    /// Finish and build the report
    #[must_use]
    pub fn finish(self) -> ScenarioReport {
        let report = ScenarioReport {
            scenario: self.name,
            steps: self.steps,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            scenario = %report.scenario,
            passed = report.passed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "scenario finished"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::MockPage;

    fn runner(page: &Arc<MockPage>, dir: &Path) -> ScenarioRunner {
        let driver: Arc<dyn PageDriver> = Arc::clone(page) as Arc<dyn PageDriver>;
        ScenarioRunner::new("checkout", driver).with_artifacts(ArtifactDirs::new(dir))
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_missing_config_is_skip() {
            let outcome = StepOutcome::from(&ConfigError::missing("MAILOSAUR_API_KEY"));
            assert!(outcome.is_skipped());
            let outcome = StepOutcome::from(&ConfigError::InvalidProfile { value: "qa".into() });
            assert!(outcome.is_failed());
        }

        #[test]
        fn test_bool_conversion() {
            assert!(true.into_step_outcome().is_passed());
            assert!(false.into_step_outcome().is_failed());
            let r: Result<bool, ConfigError> = Err(ConfigError::missing("GOOGLE_EMAIL"));
            assert!(r.into_step_outcome().is_skipped());
        }

        #[test]
        fn test_display() {
            assert_eq!(StepOutcome::Passed.to_string(), "passed");
            assert_eq!(StepOutcome::skip("no inbox").to_string(), "skipped: no inbox");
        }
    }

    mod runner_tests {
        use super::*;

        #[tokio::test]
        async fn test_screenshot_per_step() {
            let dir = tempfile::tempdir().unwrap();
            let page = MockPage::shared("https://app.test/");
            let mut run = runner(&page, dir.path());

            assert!(run.step("open pricing", || async { true }).await);
            let report = run.finish();
            assert!(report.all_passed());
            let shot = report.steps[0].screenshot.clone().unwrap();
            assert!(shot.ends_with("screenshots/checkout-open-pricing.png"));
        }

        #[tokio::test]
        async fn test_failure_captures_and_halts() {
            let dir = tempfile::tempdir().unwrap();
            let page = MockPage::shared("https://app.test/");
            let mut run = runner(&page, dir.path());

            assert!(!run.step("pay", || async { false }).await);
            assert!(!run.step("confirm", || async { true }).await);
            let report = run.finish();

            assert_eq!(report.failed_count(), 1);
            assert_eq!(report.skipped_count(), 1);
            match &report.steps[0].outcome {
                StepOutcome::Failed { screenshot, .. } => {
                    assert!(screenshot
                        .as_ref()
                        .unwrap()
                        .ends_with("screenshots/checkout-pay-failure.png"));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
            assert_eq!(page.call_count("screenshot"), 1);
        }

        #[tokio::test]
        async fn test_keep_going() {
            let page = MockPage::shared("https://app.test/");
            let driver: Arc<dyn PageDriver> = page.clone();
            let mut run = ScenarioRunner::new("events", driver).keep_going();

            assert!(!run.step("pin", || async { false }).await);
            assert!(run.step("gift", || async { true }).await);
            let report = run.finish();
            assert_eq!(report.passed_count(), 1);
            assert!(!report.all_passed());
            assert!(!page.was_called("screenshot"));
        }

        #[tokio::test]
        async fn test_skip_is_not_failure() {
            let page = MockPage::shared("https://app.test/");
            let driver: Arc<dyn PageDriver> = page;
            let mut run = ScenarioRunner::new("otp", driver);

            let missing: Result<bool, ConfigError> = Err(ConfigError::missing("MAILOSAUR_API_KEY"));
            assert!(!run.step("fetch inbox", || async { missing }).await);
            assert!(!run.step("enter code", || async { true }).await);
            let report = run.finish();
            assert!(report.all_passed());
            assert_eq!(report.skipped_count(), 2);
        }

        #[tokio::test]
        async fn test_report_json_file() {
            let dir = tempfile::tempdir().unwrap();
            let page = MockPage::shared("https://app.test/");
            let mut run = runner(&page, dir.path()).failure_screenshots_only();
            let _ = run.step("login", || async { StepOutcome::Passed }).await;
            let report = run.finish();

            let path = report.write_json(dir.path()).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["scenario"], "checkout");
            assert_eq!(value["steps"][0]["status"], "passed");
            assert_eq!(value["steps"][0]["name"], "login");
            let back: ScenarioReport = serde_json::from_str(&text).unwrap();
            assert_eq!(back, report);
        }
    }
}
