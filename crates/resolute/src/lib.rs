//! Resolute: resilient UI automation primitives for browser end-to-end suites.
//!
//! Resolute finds a logical UI affordance across markup drift, acts on it
//! with bounded retries, and logs a user in through an OAuth popup or a
//! plain credential form with a retrying state machine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  scenario      ScenarioRunner, StepOutcome, ScenarioReport    │
//! │      ▲                                                        │
//! │  pages         AppShell, EventPage, PaymentPage               │
//! │      ▲                                                        │
//! │  auth          AuthFlowController ── session, otp             │
//! │      ▲                                                        │
//! │  action        Actions (retry, settle, evidence)              │
//! │      ▲                                                        │
//! │  resolve       Resolver, Affordance (candidates, script, URL) │
//! │      ▲                                                        │
//! │  driver        PageDriver ── MockPage | ChromiumPage          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is reached only through [`PageDriver`]; [`MockPage`] backs the
//! unit tests and `ChromiumPage` (feature `browser`) drives a real browser.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation
)]
mod action;
#[allow(clippy::missing_errors_doc)]
mod auth;
mod backoff;
#[allow(
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::significant_drop_tightening,
    clippy::items_after_statements
)]
#[cfg(feature = "browser")]
mod chromium;
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
mod config;
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
mod driver;
mod evidence;
mod locator;
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::significant_drop_tightening,
    clippy::cast_possible_truncation
)]
mod mock;
#[allow(
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::doc_markdown
)]
mod otp;
#[allow(clippy::missing_errors_doc)]
pub mod pages;
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
mod resolve;
mod result;
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
mod scenario;
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
mod session;

pub use action::{
    ActionError, ActionReport, ActionResult, ActionResultExt, Actions, Reason, ToggleOutcome,
};
pub use auth::{
    choose_account, reset_storage_script, AuthConfig, AuthError, AuthFlowController, AuthMethod,
    AuthOutcome, AuthPath, AuthSelectors, AuthState, TokenCapture,
};
pub use backoff::{BackoffPolicy, RetryPolicy};
#[cfg(feature = "browser")]
pub use chromium::{ChromiumBrowser, ChromiumConfig, ChromiumPage};
pub use config::{
    ConfigError, ConfigFile, ConfigResult, Credentials, EnvironmentConfig, MailosaurSettings,
    Profile, Timeouts, DEFAULT_RESET_STORAGE_KEYS,
};
pub use driver::{
    ClickOptions, ElementInfo, LoadState, PageDriver, PopupWaiter, Probe, ResponseWaiter,
};
pub use evidence::{sanitize_name, ArtifactDirs};
pub use locator::LocatorSpec;
pub use mock::{MockEffect, MockElement, MockPage};
#[cfg(feature = "otp")]
pub use otp::MailosaurClient;
pub use otp::{extract_otp, OtpError, OtpSource, StaticOtp};
pub use pages::{
    AppShell, CardDetails, EventPage, PageContext, PageObject, PaymentPage, UrlMatcher,
};
pub use resolve::{
    script_click, script_click_source, Activation, Affordance, Resolution, ResolveAction,
    ResolvedElement, Resolver, UrlFallback, DEFAULT_CANDIDATE_TIMEOUT, SCRIPT_CLICK_MARKER,
};
pub use result::{ResoluteError, ResoluteResult};
pub use scenario::{
    IntoStepOutcome, ScenarioReport, ScenarioRunner, StepOutcome, StepResult,
};
pub use session::{
    auth_state_max_age, is_auth_state_expired, worker_key, Cookie, FileSessionStore,
    MemorySessionStore, NameValue, OriginStorage, SameSite, SessionBlob, SessionStore,
    StorageState, AUTH_STATE_MAX_AGE_HOURS, DEFAULT_SESSION_KEY,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    mod end_to_end_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_join_scenario_resolves_second_candidate() {
            let page = MockPage::shared("https://app.test/events");
            page.add_element(MockElement::new("button").with_text("Join"));
            let resolution = Resolver::new()
                .resolve(
                    page.as_ref(),
                    &LocatorSpec::parse_all(&["#missing", "button:has-text(\"Join\")"]),
                )
                .await;
            assert_eq!(resolution.found().unwrap().index, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_login_then_event_scenario() {
            let page = MockPage::shared("https://app.test/");
            page.add_element(MockElement::new("img.avatar"));
            page.add_element(
                MockElement::new("button.pin")
                    .attr("class", "pin")
                    .on_click(MockEffect::SetAttribute {
                        name: "class".into(),
                        value: "pin-active".into(),
                    }),
            );
            let driver: Arc<dyn PageDriver> = page.clone();

            let controller = AuthFlowController::new(AuthConfig::new("https://app.test/"));
            let creds = Credentials::new("qa@example.test", "secret");
            let ctx = PageContext::new(Arc::clone(&driver), "https://app.test")
                .with_actions(Actions::default().with_visibility_timeout(Duration::from_secs(1)));
            let events = EventPage::new(ctx);

            let mut run = ScenarioRunner::new("pin", driver);
            let (controller, creds, events, mock) = (&controller, &creds, &events, page.as_ref());
            assert!(
                run.step("login", move || async move {
                    controller.authenticate(mock, creds).await.is_ok()
                })
                .await
            );
            assert!(
                run.step("pin", move || async move { events.toggle_pin().await.changed })
                    .await
            );
            let report = run.finish();
            assert!(report.all_passed());
            assert_eq!(report.passed_count(), 2);
        }
    }
}
