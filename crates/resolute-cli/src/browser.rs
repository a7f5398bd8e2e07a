//! Chromium glue for the commands that drive a live page

use crate::commands::{BrowserArgs, LoginArgs, ProbeArgs};
use crate::error::CliResult;
use crate::handlers::{controller_for, credentials_for, login, print_login, print_probe, probe, resolve_url};
use crate::output::Printer;
use crate::CliError;
use resolute::{ChromiumBrowser, ChromiumConfig, EnvironmentConfig, PageDriver};
use std::time::Duration;
use tracing::{debug, warn};

/// Launch settings for `args`
#[must_use]
pub fn chromium_config(args: &BrowserArgs) -> ChromiumConfig {
    let mut config = ChromiumConfig::default().with_headless(!args.headed);
    if args.no_sandbox {
        config = config.with_no_sandbox();
    }
    if let Some(path) = &args.chromium {
        config = config.with_chromium_path(path.clone());
    }
    config
}

/// Launch chromium and log in on a fresh page
pub async fn run_login(
    printer: &Printer,
    environment: &EnvironmentConfig,
    args: &LoginArgs,
) -> CliResult<()> {
    let credentials = credentials_for(environment, args.method.into())?;
    let controller = controller_for(environment, args);

    let browser = ChromiumBrowser::launch(chromium_config(&args.browser)).await?;
    let page = browser.new_page().await?;
    let result = login(page.as_ref(), &controller, &credentials, args.force).await;
    if result.is_err() {
        let shot = environment
            .artifacts()
            .capture(page.as_ref(), "login-failure")
            .await;
        if let Some(path) = shot {
            printer.warning(&format!("failure screenshot: {}", path.display()));
        }
    }
    close(browser).await;

    print_login(printer, &result?);
    Ok(())
}

/// Launch chromium, open the target and resolve the candidates
pub async fn run_probe(
    printer: &Printer,
    environment: &EnvironmentConfig,
    args: &ProbeArgs,
) -> CliResult<()> {
    let mut resolver = environment.resolver();
    if let Some(ms) = args.timeout_ms {
        resolver = resolver.with_timeout(Duration::from_millis(ms));
    }
    let url = resolve_url(&environment.base_url, &args.url);
    let artifacts = args.screenshot.then(|| environment.artifacts());

    let browser = ChromiumBrowser::launch(chromium_config(&args.browser)).await?;
    let page = browser.new_page().await?;
    let driver: &dyn PageDriver = page.as_ref();
    let result = probe(
        driver,
        &resolver,
        &url,
        &args.candidates,
        args.click,
        environment.timeouts.navigation(),
        artifacts.as_ref(),
    )
    .await;
    close(browser).await;

    let report = result?;
    print_probe(printer, &report);
    if report.resolved() {
        Ok(())
    } else {
        Err(CliError::not_resolved(format!(
            "{} candidates on {}",
            report.candidates.len(),
            report.url
        )))
    }
}

async fn close(browser: ChromiumBrowser) {
    match browser.close().await {
        Ok(()) => debug!("browser closed"),
        Err(e) => warn!(error = %e, "browser did not close cleanly"),
    }
}
