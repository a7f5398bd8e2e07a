//! Session command handler

use crate::commands::{SessionClearArgs, SessionCommand, SessionStatusArgs};
use crate::error::CliResult;
use crate::output::Printer;
use chrono::{DateTime, Utc};
use resolute::{is_auth_state_expired, FileSessionStore, SessionStore};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Freshness of one stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Store key
    pub key: String,
    /// Backing file
    pub path: PathBuf,
    /// Whether a session is stored
    pub exists: bool,
    /// When it was saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    /// Age in minutes at the time of the check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_minutes: Option<i64>,
    /// Missing or older than the session lifetime
    pub expired: bool,
    /// Stored cookies
    pub cookies: usize,
    /// Origins with local storage
    pub origins: usize,
}

/// Status of the session stored under `key`
pub fn session_status(
    store: &FileSessionStore,
    key: &str,
    now: DateTime<Utc>,
) -> CliResult<SessionStatus> {
    let path = store.path_for(key);
    let expired = is_auth_state_expired(&path, now);
    let status = match store.load(key)? {
        Some(blob) => SessionStatus {
            key: key.to_string(),
            path,
            exists: true,
            saved_at: Some(blob.saved_at),
            age_minutes: Some(blob.age(now).num_minutes()),
            expired,
            cookies: blob.state.cookies.len(),
            origins: blob.state.origins.len(),
        },
        None => SessionStatus {
            key: key.to_string(),
            path,
            exists: false,
            saved_at: None,
            age_minutes: None,
            expired,
            cookies: 0,
            origins: 0,
        },
    };
    Ok(status)
}

/// Status of every stored session, by key
pub fn session_statuses(
    store: &FileSessionStore,
    now: DateTime<Utc>,
) -> CliResult<Vec<SessionStatus>> {
    store
        .keys()?
        .iter()
        .map(|key| session_status(store, key, now))
        .collect()
}

/// Remove the sessions under `keys`; returns the keys that existed
pub fn clear_sessions(store: &FileSessionStore, keys: &[String]) -> CliResult<Vec<String>> {
    let mut removed = Vec::new();
    for key in keys {
        if store.remove(key)? {
            info!(key = %key, "session removed");
            removed.push(key.clone());
        }
    }
    Ok(removed)
}

/// Execute a session subcommand
pub fn execute_session(
    printer: &Printer,
    store: &FileSessionStore,
    command: &SessionCommand,
    now: DateTime<Utc>,
) -> CliResult<()> {
    match command {
        SessionCommand::Status(args) => print_statuses(printer, store, args, now),
        SessionCommand::Clear(args) => clear(printer, store, args),
    }
}

fn print_statuses(
    printer: &Printer,
    store: &FileSessionStore,
    args: &SessionStatusArgs,
    now: DateTime<Utc>,
) -> CliResult<()> {
    let statuses = if args.all {
        session_statuses(store, now)?
    } else {
        vec![session_status(store, &args.session.resolve(), now)?]
    };

    if args.json {
        printer.raw(&serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        printer.warning(&format!("no sessions stored in {}", store.dir().display()));
        return Ok(());
    }
    for status in &statuses {
        let line = describe(status);
        if !status.exists {
            printer.warning(&line);
        } else if status.expired {
            printer.failure(&line);
        } else {
            printer.success(&line);
        }
        printer.field("file", &status.path.display().to_string());
        if status.exists {
            printer.field(
                "storage",
                &format!("{} cookies, {} origins", status.cookies, status.origins),
            );
        }
    }
    Ok(())
}

fn clear(printer: &Printer, store: &FileSessionStore, args: &SessionClearArgs) -> CliResult<()> {
    let keys = if args.all {
        store.keys()?
    } else {
        vec![args.session.resolve()]
    };
    let removed = clear_sessions(store, &keys)?;
    if removed.is_empty() {
        printer.warning("nothing to clear");
    } else {
        printer.success(&format!("removed {}", removed.join(", ")));
    }
    Ok(())
}

fn describe(status: &SessionStatus) -> String {
    match (status.exists, status.age_minutes) {
        (false, _) => format!("{}: no session stored", status.key),
        (true, Some(minutes)) => {
            let age = if minutes >= 60 {
                format!("{}h {}m", minutes / 60, minutes % 60)
            } else {
                format!("{minutes}m")
            };
            let freshness = if status.expired { "expired" } else { "fresh" };
            format!("{}: {freshness}, saved {age} ago", status.key)
        }
        (true, None) => format!("{}: stored", status.key),
    }
}
