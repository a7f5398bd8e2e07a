//! Command handlers - extracted from main.rs for testability
//!
//! Handlers take a [`resolute::PageDriver`] or a session store rather than
//! launching anything themselves, so they run against `MockPage` and temp
//! directories in tests.

pub mod config;
pub mod login;
pub mod probe;
pub mod session;

pub use config::{execute_config, render_config, ConfigView, CredentialPresence};
pub use login::{controller_for, credentials_for, login, print_login, LoginSummary};
pub use probe::{print_probe, probe, resolve_url, ProbeReport};
pub use session::{clear_sessions, execute_session, session_status, session_statuses, SessionStatus};
