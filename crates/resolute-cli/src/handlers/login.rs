//! Login command handler

use crate::commands::LoginArgs;
use crate::error::CliResult;
use crate::output::Printer;
use chrono::Utc;
use resolute::{
    AuthConfig, AuthFlowController, AuthMethod, AuthPath, AuthState, Credentials,
    EnvironmentConfig, LoadState, PageDriver, TokenCapture,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What the login command did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginSummary {
    /// Session key written
    pub key: String,
    /// Whether a stored session was loaded before checking
    pub restored: bool,
    /// How the login was satisfied
    pub path: AuthPath,
    /// Attempts used
    pub attempts: u32,
    /// Whether indicators confirmed the session
    pub confirmed: bool,
    /// Every state entered
    pub trail: Vec<String>,
    /// Captured token file
    pub token: Option<PathBuf>,
}

/// Credentials for `method`; missing variables are a skip
pub fn credentials_for(environment: &EnvironmentConfig, method: AuthMethod) -> CliResult<Credentials> {
    let credentials = match method {
        AuthMethod::GoogleOAuth => environment.require_google()?,
        AuthMethod::EmailPassword => environment.require_liveshare()?,
    };
    Ok(credentials.clone())
}

/// Controller for `args`, persisting to the environment's session directory
#[must_use]
pub fn controller_for(environment: &EnvironmentConfig, args: &LoginArgs) -> AuthFlowController {
    let mut config = AuthConfig::from_environment(environment)
        .with_method(args.method.into())
        .with_session_key(args.session.resolve());
    if let Some(fragment) = &args.token_url {
        config = config.with_token_capture(TokenCapture {
            url_fragment: fragment.clone(),
            output: args.token_out.clone(),
        });
    }
    AuthFlowController::new(config)
        .with_resolver(environment.resolver())
        .with_actions(environment.actions())
        .with_store(Arc::new(environment.session_store()))
}

/// Seed a stored session unless `force`, open the app root and log in
pub async fn login(
    page: &dyn PageDriver,
    controller: &AuthFlowController,
    credentials: &Credentials,
    force: bool,
) -> CliResult<LoginSummary> {
    let config = controller.config();
    let restored = if force {
        false
    } else {
        controller.restore_session(page, Utc::now()).await?
    };

    page.goto(&config.root_url, LoadState::Load, config.navigation_timeout)
        .await?;
    let outcome = controller.authenticate(page, credentials).await?;
    info!(key = %config.session_key, path = ?outcome.path, restored, "login finished");

    Ok(LoginSummary {
        key: config.session_key.clone(),
        restored,
        path: outcome.path,
        attempts: outcome.attempts,
        confirmed: outcome.confirmed,
        trail: outcome.trail.iter().map(AuthState::to_string).collect(),
        token: outcome.token,
    })
}

/// Print a login summary
pub fn print_login(printer: &Printer, summary: &LoginSummary) {
    let how = match summary.path {
        AuthPath::ExistingSession if summary.restored => "restored stored session",
        AuthPath::ExistingSession => "already logged in",
        AuthPath::Interactive => "logged in through the UI",
        AuthPath::UrlFallback => "login UI unreachable, verified by navigation",
    };
    printer.success(&format!("{}: {how}", summary.key));
    printer.field("attempts", &summary.attempts.to_string());
    if !summary.confirmed {
        printer.warning("no logged-in indicator confirmed the session");
    }
    printer.field("states", &summary.trail.join(" → "));
    if let Some(token) = &summary.token {
        printer.field("token", &token.display().to_string());
    }
}
