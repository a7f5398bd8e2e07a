//! Probe command handler

use crate::error::{CliError, CliResult};
use crate::output::Printer;
use resolute::{
    ArtifactDirs, LoadState, LocatorSpec, PageDriver, Resolution, ResolveAction, Resolver,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Outcome of probing a candidate list on one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// Page probed
    pub url: String,
    /// Candidates in priority order, normalized
    pub candidates: Vec<String>,
    /// Index of the first visible candidate
    pub winner: Option<usize>,
    /// Candidates that matched only hidden elements
    pub hidden: Vec<usize>,
    /// Whether the winner was clicked
    pub clicked: bool,
    /// Time spent resolving
    pub elapsed_ms: u64,
    /// Screenshot taken after probing
    pub screenshot: Option<PathBuf>,
}

impl ProbeReport {
    /// Whether a candidate resolved
    #[must_use]
    pub const fn resolved(&self) -> bool {
        self.winner.is_some()
    }
}

/// Absolute URL for `target`: absolute URLs pass through, paths join `base_url`
#[must_use]
pub fn resolve_url(base_url: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

/// Open `url` and resolve `candidates` on it, clicking the winner if asked
pub async fn probe(
    page: &dyn PageDriver,
    resolver: &Resolver,
    url: &str,
    candidates: &[String],
    click: bool,
    navigation_timeout: Duration,
    artifacts: Option<&ArtifactDirs>,
) -> CliResult<ProbeReport> {
    if candidates.is_empty() {
        return Err(CliError::invalid_argument("at least one candidate is required"));
    }
    let specs: Vec<LocatorSpec> = candidates.iter().map(|c| LocatorSpec::parse(c)).collect();

    page.goto(url, LoadState::DomContentLoaded, navigation_timeout)
        .await?;

    let action = if click {
        ResolveAction::Click
    } else {
        ResolveAction::IsVisible
    };
    let started = Instant::now();
    let resolution = resolver.resolve_and_act(page, &specs, action).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (winner, hidden) = match &resolution {
        Resolution::Found(found) => (Some(found.index), Vec::new()),
        Resolution::NotVisible { matched } => (None, matched.clone()),
        Resolution::NotFound => (None, Vec::new()),
    };
    info!(url, ?winner, elapsed_ms, "probe finished");

    let screenshot = match artifacts {
        Some(dirs) => dirs.capture(page, "probe").await,
        None => None,
    };

    Ok(ProbeReport {
        url: url.to_string(),
        candidates: specs.iter().map(ToString::to_string).collect(),
        winner,
        hidden,
        clicked: click && winner.is_some(),
        elapsed_ms,
        screenshot,
    })
}

/// Print a probe report, one line per candidate
pub fn print_probe(printer: &Printer, report: &ProbeReport) {
    printer.header(&format!("Probe {}", report.url));
    for (index, candidate) in report.candidates.iter().enumerate() {
        if report.winner == Some(index) {
            let verb = if report.clicked { "clicked" } else { "visible" };
            printer.success(&format!("[{index}] {candidate} ({verb})"));
        } else if report.hidden.contains(&index) {
            printer.warning(&format!("[{index}] {candidate} (matched, hidden)"));
        } else if report.winner.is_some_and(|w| index > w) {
            printer.field(&format!("[{index}]"), &format!("{candidate} (not tried)"));
        } else {
            printer.failure(&format!("[{index}] {candidate} (no match)"));
        }
    }
    printer.field("elapsed", &format!("{} ms", report.elapsed_ms));
    if let Some(path) = &report.screenshot {
        printer.field("screenshot", &path.display().to_string());
    }
}
