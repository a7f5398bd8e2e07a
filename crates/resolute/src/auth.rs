//! Authentication flow controller.
//!
//! Drives a login as a state machine wrapped in a retry loop:
//!
//! ```text
//! CheckingSession -> ChoosingProvider -> AccountChooser | CredentialForm
//!                 -> Submitting -> Verifying -> Authenticated | Failed
//! ```
//!
//! Any error inside an attempt is logged and turned into a failed attempt,
//! after which the logged-in shortcut is re-checked: the login may have
//! landed just as a step judged it failed. Between attempts the page is reset
//! and the controller sleeps `base * attempt`.

use crate::action::{ActionError, Actions};
use crate::backoff::RetryPolicy;
use crate::config::{Credentials, EnvironmentConfig};
use crate::driver::{ClickOptions, LoadState, PageDriver, ResponseWaiter};
use crate::locator::LocatorSpec;
use crate::resolve::{Resolver, UrlFallback};
use crate::result::ResoluteError;
use crate::session::{auth_state_max_age, SessionBlob, SessionStore, DEFAULT_SESSION_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Login flow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Probing logged-in indicators
    CheckingSession,
    /// Opening the identity provider popup
    ChoosingProvider,
    /// Picking an account from the provider's list
    AccountChooser,
    /// Typing email and password
    CredentialForm,
    /// Credentials submitted
    Submitting,
    /// Waiting for the app to reflect the login
    Verifying,
    /// Logged in
    Authenticated,
    /// Attempt failed
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckingSession => "checking-session",
            Self::ChoosingProvider => "choosing-provider",
            Self::AccountChooser => "account-chooser",
            Self::CredentialForm => "credential-form",
            Self::Submitting => "submitting",
            Self::Verifying => "verifying",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How to log in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Identity provider popup
    #[default]
    GoogleOAuth,
    /// The application's own form, no popup
    EmailPassword,
}

/// How the login was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPath {
    /// Already logged in
    ExistingSession,
    /// Completed through the UI
    Interactive,
    /// UI unreachable; verified navigation stood in
    UrlFallback,
}

/// Successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// How the login was satisfied
    pub path: AuthPath,
    /// Attempts used
    pub attempts: u32,
    /// Whether indicators confirmed the session after submitting
    pub confirmed: bool,
    /// Every state entered, in order
    pub trail: Vec<AuthState>,
    /// Captured token file
    pub token: Option<PathBuf>,
}

/// Login failure
#[derive(Debug, Error)]
pub enum AuthError {
    /// Every attempt failed
    #[error("Authentication failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: String,
    },
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Engine(#[from] ResoluteError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("{0}")]
    Flow(String),
}

/// Candidate lists for every affordance the flow touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSelectors {
    /// Any visible one means "logged in"
    pub logged_in: Vec<LocatorSpec>,
    /// Entry point to the login UI; clicked when present
    pub sign_in_entry: Vec<LocatorSpec>,
    /// Provider button that opens the popup
    pub provider_button: Vec<LocatorSpec>,
    /// Header of the provider's account list
    pub chooser_header: Vec<LocatorSpec>,
    /// Each account row in the list
    pub account_entries: LocatorSpec,
    /// Provider email input
    pub email_input: Vec<LocatorSpec>,
    /// Provider "next" after email
    pub email_next: Vec<LocatorSpec>,
    /// Provider password input
    pub password_input: Vec<LocatorSpec>,
    /// Provider "next" after password
    pub password_next: Vec<LocatorSpec>,
    /// Application form email input
    pub form_email: Vec<LocatorSpec>,
    /// Application form password input
    pub form_password: Vec<LocatorSpec>,
    /// Application form submit
    pub form_submit: Vec<LocatorSpec>,
}

impl Default for AuthSelectors {
    fn default() -> Self {
        Self {
            logged_in: LocatorSpec::parse_all(&[
                "[data-testid=user-avatar]",
                "img.avatar",
                "role=button[name=\"Profile\"]",
            ]),
            sign_in_entry: LocatorSpec::parse_all(&[
                "role=button[name=\"Sign in\"]",
                "a:has-text(\"Log in\")",
            ]),
            provider_button: LocatorSpec::parse_all(&[
                "button:has-text(\"Continue with Google\")",
                "role=button[name=\"Google\"]",
                "[data-provider=google]",
            ]),
            chooser_header: LocatorSpec::parse_all(&["text=Choose an account"]),
            account_entries: LocatorSpec::css("[data-identifier]"),
            email_input: LocatorSpec::parse_all(&["input[type=email]", "#identifierId"]),
            email_next: LocatorSpec::parse_all(&["#identifierNext", "button:has-text(\"Next\")"]),
            password_input: LocatorSpec::parse_all(&["input[type=password]", "input[name=Passwd]"]),
            password_next: LocatorSpec::parse_all(&["#passwordNext", "button:has-text(\"Next\")"]),
            form_email: LocatorSpec::parse_all(&["input[name=email]", "input[type=email]"]),
            form_password: LocatorSpec::parse_all(&["input[name=password]", "input[type=password]"]),
            form_submit: LocatorSpec::parse_all(&["button[type=submit]", "button:has-text(\"Log in\")"]),
        }
    }
}

/// Where to write a bearer token observed during login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCapture {
    /// Fragment of the token endpoint URL
    pub url_fragment: String,
    /// Output file
    pub output: PathBuf,
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Login method
    pub method: AuthMethod,
    /// Attempts and backoff
    pub retry: RetryPolicy,
    /// Application root, used to reset between attempts
    pub root_url: String,
    /// Storage keys removed between attempts
    pub reset_storage_keys: Vec<String>,
    /// Popup appearance
    pub popup_timeout: Duration,
    /// Popup close after submit
    pub popup_close_timeout: Duration,
    /// Network idle after submit
    pub network_idle_timeout: Duration,
    /// Reset navigation
    pub navigation_timeout: Duration,
    /// Verified navigation tried after exhaustion
    pub url_fallback: Option<UrlFallback>,
    /// Key for the session store
    pub session_key: String,
    /// Optional token capture
    pub token_capture: Option<TokenCapture>,
}

impl AuthConfig {
    /// Defaults for an application rooted at `root_url`
    #[must_use]
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::GoogleOAuth,
            retry: RetryPolicy::authentication(),
            root_url: root_url.into(),
            reset_storage_keys: Vec::new(),
            popup_timeout: Duration::from_secs(60),
            popup_close_timeout: Duration::from_secs(15),
            network_idle_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            url_fallback: None,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            token_capture: None,
        }
    }

    /// Derive from a resolved environment
    #[must_use]
    pub fn from_environment(env: &EnvironmentConfig) -> Self {
        Self {
            retry: env.auth_retry,
            reset_storage_keys: env.reset_storage_keys.clone(),
            popup_timeout: env.timeouts.popup(),
            popup_close_timeout: env.timeouts.popup_close(),
            network_idle_timeout: env.timeouts.network_idle(),
            navigation_timeout: env.timeouts.navigation(),
            ..Self::new(env.url("/"))
        }
    }

    /// Set the method
    #[must_use]
    pub const fn with_method(mut self, method: AuthMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the verified URL fallback
    #[must_use]
    pub fn with_url_fallback(mut self, fallback: UrlFallback) -> Self {
        self.url_fallback = Some(fallback);
        self
    }

    /// Set the session key
    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    /// Capture the token endpoint's response
    #[must_use]
    pub fn with_token_capture(mut self, capture: TokenCapture) -> Self {
        self.token_capture = Some(capture);
        self
    }

    /// Set storage keys removed between attempts
    #[must_use]
    pub fn with_reset_storage_keys(mut self, keys: Vec<String>) -> Self {
        self.reset_storage_keys = keys;
        self
    }
}

/// Index of the first entry containing `email`, else the first entry
#[must_use]
pub fn choose_account(entries: &[String], email: &str) -> Option<usize> {
    let needle = email.to_ascii_lowercase();
    entries
        .iter()
        .position(|e| e.to_ascii_lowercase().contains(&needle))
        .or_else(|| (!entries.is_empty()).then_some(0))
}

/// Script removing `keys` from local and session storage
#[must_use]
pub fn reset_storage_script(keys: &[String]) -> String {
    let list = serde_json::to_string(keys).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ for (const k of {list}) {{ \
         try {{ localStorage.removeItem(k); }} catch (e) {{}} \
         try {{ sessionStorage.removeItem(k); }} catch (e) {{}} }} \
         return true; }})()"
    )
}

struct Trail {
    states: Vec<AuthState>,
}

impl Trail {
    fn enter(&mut self, state: AuthState, attempt: u32) {
        info!(%state, attempt, "auth state");
        self.states.push(state);
    }
}

/// Login state machine with retries
#[derive(Debug, Clone)]
pub struct AuthFlowController {
    config: AuthConfig,
    selectors: AuthSelectors,
    resolver: Resolver,
    actions: Actions,
    store: Option<Arc<dyn SessionStore>>,
}

impl AuthFlowController {
    /// Controller with default selectors, resolver and actions
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            selectors: AuthSelectors::default(),
            resolver: Resolver::new(),
            actions: Actions::default(),
            store: None,
        }
    }

    /// Override selectors
    #[must_use]
    pub fn with_selectors(mut self, selectors: AuthSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Override the resolver
    #[must_use]
    pub const fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Override the action primitives
    #[must_use]
    pub fn with_actions(mut self, actions: Actions) -> Self {
        self.actions = actions;
        self
    }

    /// Persist sessions to `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Controller tuning
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Seed `page` with a fresh stored session; `false` when none exists
    pub async fn restore_session(
        &self,
        page: &dyn PageDriver,
        now: DateTime<Utc>,
    ) -> crate::ResoluteResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load_fresh(&self.config.session_key, now, auth_state_max_age())? {
            Some(blob) => {
                page.apply_storage_state(&blob.state).await?;
                info!(key = %self.config.session_key, saved_at = %blob.saved_at, "session restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether any logged-in indicator is visible
    pub async fn is_logged_in(&self, page: &dyn PageDriver) -> bool {
        self.resolver
            .resolve(page, &self.selectors.logged_in)
            .await
            .is_found()
    }

    /// Log in, retrying per the policy
    pub async fn authenticate(
        &self,
        page: &dyn PageDriver,
        credentials: &Credentials,
    ) -> Result<AuthOutcome, AuthError> {
        let attempts = self.config.retry.attempts();
        let mut trail = Trail { states: Vec::new() };
        let mut last = String::new();

        for attempt in 1..=attempts {
            trail.enter(AuthState::CheckingSession, attempt);
            if self.is_logged_in(page).await {
                trail.enter(AuthState::Authenticated, attempt);
                return Ok(self
                    .succeed(page, AuthPath::ExistingSession, attempt, true, trail, None)
                    .await);
            }

            let mut token_waiter = None;
            match self
                .attempt(page, credentials, attempt, &mut trail, &mut token_waiter)
                .await
            {
                Ok(confirmed) => {
                    trail.enter(AuthState::Authenticated, attempt);
                    return Ok(self
                        .succeed(page, AuthPath::Interactive, attempt, confirmed, trail, token_waiter)
                        .await);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "authentication attempt failed");
                    trail.enter(AuthState::Failed, attempt);
                    last = e.to_string();
                }
            }

            if self.is_logged_in(page).await {
                info!(attempt, "logged in despite the failed attempt");
                trail.enter(AuthState::Authenticated, attempt);
                return Ok(self
                    .succeed(page, AuthPath::Interactive, attempt, true, trail, token_waiter)
                    .await);
            }

            if let Some(delay) = self.config.retry.delay_after(attempt) {
                self.reset(page).await;
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(fallback) = &self.config.url_fallback {
            if self.resolver.navigate_verified(page, fallback).await {
                warn!(url = %fallback.url, "login UI unreachable; verified navigation used instead");
                trail.enter(AuthState::Authenticated, attempts);
                return Ok(self
                    .succeed(page, AuthPath::UrlFallback, attempts, true, trail, None)
                    .await);
            }
        }

        Err(AuthError::Exhausted { attempts, last })
    }

    async fn attempt(
        &self,
        page: &dyn PageDriver,
        credentials: &Credentials,
        attempt: u32,
        trail: &mut Trail,
        token_waiter: &mut Option<ResponseWaiter>,
    ) -> Result<bool, StepError> {
        if !self.selectors.sign_in_entry.is_empty() {
            let entry = self
                .resolver
                .resolve(page, &self.selectors.sign_in_entry)
                .await;
            if let Some(found) = entry.found() {
                page.click(&found.locator, ClickOptions::forced()).await?;
            }
        }

        if let Some(capture) = &self.config.token_capture {
            match page.expect_response(&capture.url_fragment).await {
                Ok(waiter) => *token_waiter = Some(waiter),
                Err(e) => warn!(error = %e, "token listener not registered"),
            }
        }

        match self.config.method {
            AuthMethod::GoogleOAuth => self.provider_flow(page, credentials, attempt, trail).await,
            AuthMethod::EmailPassword => self.form_flow(page, credentials, attempt, trail).await,
        }
    }

    async fn provider_flow(
        &self,
        page: &dyn PageDriver,
        credentials: &Credentials,
        attempt: u32,
        trail: &mut Trail,
    ) -> Result<bool, StepError> {
        trail.enter(AuthState::ChoosingProvider, attempt);
        // listener first: a popup opened before registration is lost
        let waiter = page.expect_popup().await?;
        self.actions
            .click_any(page, &self.selectors.provider_button)
            .await?;
        let popup = waiter.wait(self.config.popup_timeout).await?;
        let popup = popup.as_ref();

        let chooser = self
            .resolver
            .resolve(popup, &self.selectors.chooser_header)
            .await;
        if chooser.is_found() {
            trail.enter(AuthState::AccountChooser, attempt);
            let entries = popup.texts(&self.selectors.account_entries).await?;
            let index = choose_account(&entries, &credentials.email)
                .ok_or_else(|| StepError::Flow("account chooser lists no accounts".to_string()))?;
            debug!(index, total = entries.len(), "choosing account");
            popup
                .click(
                    &self.selectors.account_entries,
                    ClickOptions::forced().with_nth(index),
                )
                .await?;

            // the provider may still ask for the password
            let reprompt = self
                .resolver
                .resolve(popup, &self.selectors.password_input)
                .await;
            if let Some(found) = reprompt.found() {
                trail.enter(AuthState::CredentialForm, attempt);
                self.actions
                    .fill(popup, &found.locator, &credentials.password)
                    .await?;
                self.actions
                    .click_any(popup, &self.selectors.password_next)
                    .await?;
            }
        } else {
            trail.enter(AuthState::CredentialForm, attempt);
            self.actions
                .fill_any(popup, &self.selectors.email_input, &credentials.email)
                .await?;
            self.actions
                .click_any(popup, &self.selectors.email_next)
                .await?;
            self.actions
                .fill_any(popup, &self.selectors.password_input, &credentials.password)
                .await?;
            self.actions
                .click_any(popup, &self.selectors.password_next)
                .await?;
        }

        trail.enter(AuthState::Submitting, attempt);
        match popup.wait_for_close(self.config.popup_close_timeout).await {
            Ok(true) => debug!("popup closed"),
            Ok(false) => warn!("popup still open after submit; verifying anyway"),
            Err(e) => warn!(error = %e, "popup close wait failed; verifying anyway"),
        }

        Ok(self.verify(page, attempt, trail).await)
    }

    async fn form_flow(
        &self,
        page: &dyn PageDriver,
        credentials: &Credentials,
        attempt: u32,
        trail: &mut Trail,
    ) -> Result<bool, StepError> {
        trail.enter(AuthState::CredentialForm, attempt);
        self.actions
            .fill_any(page, &self.selectors.form_email, &credentials.email)
            .await?;
        self.actions
            .fill_any(page, &self.selectors.form_password, &credentials.password)
            .await?;
        trail.enter(AuthState::Submitting, attempt);
        self.actions
            .click_any(page, &self.selectors.form_submit)
            .await?;
        Ok(self.verify(page, attempt, trail).await)
    }

    async fn verify(&self, page: &dyn PageDriver, attempt: u32, trail: &mut Trail) -> bool {
        trail.enter(AuthState::Verifying, attempt);
        if let Err(e) = page
            .wait_for_load_state(LoadState::NetworkIdle, self.config.network_idle_timeout)
            .await
        {
            warn!(error = %e, "network idle wait failed");
        }
        let confirmed = self.is_logged_in(page).await;
        if !confirmed {
            warn!(attempt, "no logged-in indicator after submit");
        }
        confirmed
    }

    async fn reset(&self, page: &dyn PageDriver) {
        if let Err(e) = page
            .goto(&self.config.root_url, LoadState::Load, self.config.navigation_timeout)
            .await
        {
            debug!(error = %e, "reset navigation failed");
        }
        if !self.config.reset_storage_keys.is_empty() {
            let script = reset_storage_script(&self.config.reset_storage_keys);
            if let Err(e) = page.evaluate(&script).await {
                debug!(error = %e, "storage reset failed");
            }
        }
    }

    async fn succeed(
        &self,
        page: &dyn PageDriver,
        path: AuthPath,
        attempts: u32,
        confirmed: bool,
        trail: Trail,
        token_waiter: Option<ResponseWaiter>,
    ) -> AuthOutcome {
        self.persist(page).await;
        let token = match token_waiter {
            Some(waiter) => self.write_token(waiter),
            None => None,
        };
        info!(?path, attempts, confirmed, "authenticated");
        AuthOutcome {
            path,
            attempts,
            confirmed,
            trail: trail.states,
            token,
        }
    }

    async fn persist(&self, page: &dyn PageDriver) {
        let Some(store) = &self.store else {
            return;
        };
        let state = match page.storage_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "could not read storage state");
                return;
            }
        };
        if let Err(e) = store.save(&self.config.session_key, &SessionBlob::now(state)) {
            warn!(key = %self.config.session_key, error = %e, "could not persist session");
        }
    }

    fn write_token(&self, mut waiter: ResponseWaiter) -> Option<PathBuf> {
        let capture = self.config.token_capture.as_ref()?;
        let Some(body) = waiter.try_take() else {
            debug!(fragment = waiter.url_fragment(), "no token response observed");
            return None;
        };
        if body.get("access_token").and_then(|t| t.as_str()).is_none() {
            warn!("token response has no access_token");
            return None;
        }
        let written = capture
            .output
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| {
                let text = serde_json::to_string_pretty(&body).map_err(std::io::Error::from)?;
                std::fs::write(&capture.output, text)
            });
        match written {
            Ok(()) => {
                info!(path = %capture.output.display(), "token captured");
                Some(capture.output.clone())
            }
            Err(e) => {
                warn!(error = %e, "token capture failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEffect, MockElement, MockPage};
    use crate::session::{MemorySessionStore, StorageState};
    use serde_json::json;
    use tokio::time::Instant;

    const AVATAR: &str = "img.avatar";

    fn creds() -> Credentials {
        Credentials::new("qa@example.test", "s3cret")
    }

    fn selectors() -> AuthSelectors {
        AuthSelectors {
            logged_in: LocatorSpec::parse_all(&[AVATAR]),
            sign_in_entry: Vec::new(),
            provider_button: LocatorSpec::parse_all(&["#google"]),
            chooser_header: LocatorSpec::parse_all(&["text=Choose an account"]),
            account_entries: LocatorSpec::css("[data-identifier]"),
            email_input: LocatorSpec::parse_all(&["input[type=email]"]),
            email_next: LocatorSpec::parse_all(&["#identifierNext"]),
            password_input: LocatorSpec::parse_all(&["input[type=password]"]),
            password_next: LocatorSpec::parse_all(&["#passwordNext"]),
            form_email: LocatorSpec::parse_all(&["input[name=email]"]),
            form_password: LocatorSpec::parse_all(&["input[name=password]"]),
            form_submit: LocatorSpec::parse_all(&["button[type=submit]"]),
        }
    }

    fn controller() -> AuthFlowController {
        AuthFlowController::new(
            AuthConfig::new("https://app.test/").with_reset_storage_keys(vec!["token".into()]),
        )
        .with_selectors(selectors())
        .with_actions(Actions::default().with_visibility_timeout(Duration::from_secs(1)))
    }

    fn main_page() -> Arc<MockPage> {
        let page = MockPage::shared("https://app.test/");
        page.add_element(MockElement::new(AVATAR).hidden());
        page
    }

    /// Popup showing the account chooser; picking an entry closes it and logs in
    fn chooser_popup(main: &Arc<MockPage>) -> Arc<MockPage> {
        let popup = MockPage::shared("https://accounts.test/");
        popup.add_element(MockElement::new("div.header").with_text("Choose an account"));
        let login = |el: MockElement| {
            el.on_click(MockEffect::Reveal {
                page: Arc::clone(main),
                locator: AVATAR.into(),
            })
            .on_click(MockEffect::ClosePage)
        };
        popup.add_element(login(
            MockElement::new("[data-identifier]").with_text("Other Person other@example.test"),
        ));
        popup.add_element(login(
            MockElement::new("[data-identifier]").with_text("QA Bot qa@example.test"),
        ));
        popup
    }

    fn with_provider(main: &Arc<MockPage>, popup: Arc<MockPage>) {
        main.add_element(MockElement::new("#google").on_click(MockEffect::OpenPopup(popup)));
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn test_choose_account_substring() {
            let entries = vec![
                "Someone else\nsomeone@example.test".to_string(),
                "QA Bot\nQA@Example.test".to_string(),
            ];
            assert_eq!(choose_account(&entries, "qa@example.test"), Some(1));
        }

        #[test]
        fn test_choose_account_defaults_to_first() {
            let entries = vec!["a@x.test".to_string(), "b@x.test".to_string()];
            assert_eq!(choose_account(&entries, "qa@example.test"), Some(0));
            assert_eq!(choose_account(&[], "qa@example.test"), None);
        }

        #[test]
        fn test_reset_script_lists_keys() {
            let script = reset_storage_script(&["token".to_string(), "user".to_string()]);
            assert!(script.contains("[\"token\",\"user\"]"));
            assert!(script.contains("sessionStorage.removeItem"));
        }

        #[test]
        fn test_state_display() {
            assert_eq!(AuthState::AccountChooser.to_string(), "account-chooser");
        }

        #[test]
        fn test_from_environment() {
            let env = EnvironmentConfig::build(crate::config::ConfigFile::default(), |_| None).unwrap();
            let cfg = AuthConfig::from_environment(&env);
            assert_eq!(cfg.root_url, "http://localhost:3000/");
            assert_eq!(cfg.retry, RetryPolicy::authentication());
            assert_eq!(cfg.popup_timeout, Duration::from_secs(60));
        }
    }

    mod flow_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_existing_session_is_idempotent() {
            let page = MockPage::new("https://app.test/").with_element(MockElement::new(AVATAR));
            let outcome = controller().authenticate(&page, &creds()).await.unwrap();

            assert_eq!(outcome.path, AuthPath::ExistingSession);
            assert_eq!(outcome.attempts, 1);
            assert_eq!(
                outcome.trail,
                vec![AuthState::CheckingSession, AuthState::Authenticated]
            );
            assert!(page
                .history()
                .iter()
                .all(|c| c.starts_with("wait_for_visible")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_repeated_authenticate_never_opens_popup() {
            let page = MockPage::new("https://app.test/").with_element(MockElement::new(AVATAR));
            let ctl = controller();

            let first = ctl.authenticate(&page, &creds()).await.unwrap();
            let second = ctl.authenticate(&page, &creds()).await.unwrap();

            assert_eq!(first.path, AuthPath::ExistingSession);
            assert_eq!(second.path, AuthPath::ExistingSession);
            assert!(!page.was_called("expect_popup"));
            assert_eq!(page.call_count("wait_for_visible:img.avatar"), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_account_chooser_picks_matching_email() {
            let main = main_page();
            with_provider(&main, chooser_popup(&main));

            let outcome = controller().authenticate(main.as_ref(), &creds()).await.unwrap();

            assert_eq!(outcome.path, AuthPath::Interactive);
            assert!(outcome.confirmed);
            assert!(outcome.trail.contains(&AuthState::AccountChooser));
            assert!(!outcome.trail.contains(&AuthState::CredentialForm));
            assert_eq!(outcome.trail.last(), Some(&AuthState::Authenticated));
        }

        #[tokio::test(start_paused = true)]
        async fn test_popup_listener_registered_before_click() {
            let main = main_page();
            with_provider(&main, chooser_popup(&main));
            let _ = controller().authenticate(main.as_ref(), &creds()).await.unwrap();

            let history = main.history();
            let listen = history.iter().position(|c| c == "expect_popup").unwrap();
            let click = history.iter().position(|c| c.starts_with("click:#google")).unwrap();
            assert!(listen < click);
            assert!(!main.was_called("popup_missed"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_credential_form_path() {
            let main = main_page();
            let popup = MockPage::shared("https://accounts.test/");
            popup.add_element(MockElement::new("input[type=email]"));
            popup.add_element(MockElement::new("input[type=password]").hidden());
            popup.add_element(
                MockElement::new("#identifierNext")
                    .on_click(MockEffect::RevealHere("input[type=password]".into())),
            );
            popup.add_element(
                MockElement::new("#passwordNext")
                    .on_click(MockEffect::Reveal {
                        page: Arc::clone(&main),
                        locator: AVATAR.into(),
                    })
                    .on_click(MockEffect::ClosePage),
            );
            with_provider(&main, Arc::clone(&popup));

            let outcome = controller().authenticate(main.as_ref(), &creds()).await.unwrap();

            assert!(outcome.trail.contains(&AuthState::CredentialForm));
            assert_eq!(
                popup.value_of(&"input[type=email]".into()).as_deref(),
                Some("qa@example.test")
            );
            assert_eq!(
                popup.value_of(&"input[type=password]".into()).as_deref(),
                Some("s3cret")
            );
            assert!(popup.is_closed());
        }

        #[tokio::test(start_paused = true)]
        async fn test_popup_that_never_closes_is_tolerated() {
            let main = main_page();
            let popup = MockPage::shared("https://accounts.test/");
            popup.add_element(MockElement::new("div.header").with_text("Choose an account"));
            popup.add_element(
                MockElement::new("[data-identifier]")
                    .with_text("qa@example.test")
                    .on_click(MockEffect::Reveal {
                        page: Arc::clone(&main),
                        locator: AVATAR.into(),
                    }),
            );
            with_provider(&main, Arc::clone(&popup));

            let outcome = controller().authenticate(main.as_ref(), &creds()).await.unwrap();
            assert!(outcome.confirmed);
            assert!(!popup.is_closed());
            assert!(popup.was_called("wait_for_close"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_retry_exhaustion() {
            let main = main_page();
            let start = Instant::now();
            let err = controller().authenticate(main.as_ref(), &creds()).await.unwrap_err();

            let AuthError::Exhausted { attempts, last } = err;
            assert_eq!(attempts, 3);
            assert!(last.contains("#google"));
            // reset only between attempts
            assert_eq!(main.call_count("goto:https://app.test/"), 2);
            assert_eq!(main.call_count("evaluate:"), 2);
            // linear backoff 3s + 6s on top of the probing
            assert!(start.elapsed() >= Duration::from_secs(9));
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_attempt_rechecks_shortcut() {
            let main = main_page();
            // the click logs in but no popup ever shows up
            main.add_element(MockElement::new("#google").on_click(MockEffect::RevealHere(AVATAR.into())));

            let outcome = controller().authenticate(main.as_ref(), &creds()).await.unwrap();
            assert_eq!(outcome.attempts, 1);
            assert!(outcome.trail.contains(&AuthState::Failed));
            assert!(!main.was_called("goto"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_verified_url_fallback_after_exhaustion() {
            let main = main_page();
            main.add_element(MockElement::new("h1.dashboard"));
            let ctl = AuthFlowController::new(
                AuthConfig::new("https://app.test/")
                    .with_retry(RetryPolicy::authentication().with_max_attempts(1))
                    .with_url_fallback(UrlFallback::new(
                        "https://app.test/dashboard",
                        vec!["h1.dashboard".into()],
                    )),
            )
            .with_selectors(selectors())
            .with_actions(Actions::default().with_visibility_timeout(Duration::from_secs(1)));

            let outcome = ctl.authenticate(main.as_ref(), &creds()).await.unwrap();
            assert_eq!(outcome.path, AuthPath::UrlFallback);
            assert_eq!(main.url(), "https://app.test/dashboard");
        }

        #[tokio::test(start_paused = true)]
        async fn test_email_password_method() {
            let main = main_page();
            main.add_element(MockElement::new("input[name=email]"));
            main.add_element(MockElement::new("input[name=password]"));
            main.add_element(
                MockElement::new("button[type=submit]").on_click(MockEffect::RevealHere(AVATAR.into())),
            );
            let ctl = AuthFlowController::new(
                AuthConfig::new("https://app.test/").with_method(AuthMethod::EmailPassword),
            )
            .with_selectors(selectors());

            let outcome = ctl.authenticate(main.as_ref(), &creds()).await.unwrap();
            assert!(outcome.confirmed);
            assert!(!main.was_called("expect_popup"));
            assert_eq!(
                main.value_of(&"input[name=password]".into()).as_deref(),
                Some("s3cret")
            );
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_success_persists_session() {
            let main = main_page();
            main.set_storage(StorageState::new().with_local_storage("https://app.test", "token", "abc"));
            with_provider(&main, chooser_popup(&main));
            let store = Arc::new(MemorySessionStore::new());
            let ctl = AuthFlowController::new(
                AuthConfig::new("https://app.test/")
                    .with_reset_storage_keys(vec!["token".into()])
                    .with_session_key("user-auth-w2"),
            )
            .with_selectors(selectors())
            .with_actions(Actions::default().with_visibility_timeout(Duration::from_secs(1)))
            .with_store(store.clone());

            let _ = ctl.authenticate(main.as_ref(), &creds()).await.unwrap();
            let blob = store.load("user-auth-w2").unwrap().unwrap();
            assert_eq!(blob.state.local_storage_value("https://app.test", "token"), Some("abc"));
        }

        #[tokio::test]
        async fn test_restore_session() {
            let store = Arc::new(MemorySessionStore::new());
            let state = StorageState::new().with_local_storage("https://app.test", "token", "abc");
            store.save(DEFAULT_SESSION_KEY, &SessionBlob::now(state)).unwrap();
            let page = MockPage::new("https://app.test/");

            let restored = controller()
                .with_store(store)
                .restore_session(&page, Utc::now())
                .await
                .unwrap();
            assert!(restored);
            assert!(page.was_called("apply_storage_state"));
        }

        #[tokio::test]
        async fn test_restore_skips_stale_session() {
            let store = Arc::new(MemorySessionStore::new());
            let saved = Utc::now() - chrono::Duration::hours(25);
            store
                .save(DEFAULT_SESSION_KEY, &SessionBlob::saved_at(StorageState::new(), saved))
                .unwrap();
            let page = MockPage::new("https://app.test/");

            assert!(!controller()
                .with_store(store)
                .restore_session(&page, Utc::now())
                .await
                .unwrap());
            assert!(!page.was_called("apply_storage_state"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_token_capture() {
            let tmp = tempfile::tempdir().unwrap();
            let output = tmp.path().join("tokens/google.json");
            let main = main_page();
            let popup = chooser_popup(&main);
            main.add_element(
                MockElement::new("#google")
                    .on_click(MockEffect::Respond {
                        page: Arc::clone(&main),
                        url: "https://oauth2.example.test/token".into(),
                        body: json!({"access_token": "ya29.token", "expires_in": 3599}),
                    })
                    .on_click(MockEffect::OpenPopup(popup)),
            );
            let ctl = AuthFlowController::new(AuthConfig::new("https://app.test/").with_token_capture(
                TokenCapture {
                    url_fragment: "/token".into(),
                    output: output.clone(),
                },
            ))
            .with_selectors(selectors())
            .with_actions(Actions::default().with_visibility_timeout(Duration::from_secs(1)));

            let outcome = ctl.authenticate(main.as_ref(), &creds()).await.unwrap();
            assert_eq!(outcome.token.as_deref(), Some(output.as_path()));
            let written = std::fs::read_to_string(&output).unwrap();
            assert!(written.contains("ya29.token"));
        }
    }
}
