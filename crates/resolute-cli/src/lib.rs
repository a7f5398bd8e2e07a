//! Resolute CLI: command line front end for the resolute automation library
//!
//! ## Usage
//!
//! ```bash
//! resolute login --worker 2                 # Log in, persist auth/user-auth-w2.json
//! resolute session status --all             # Age and freshness of stored sessions
//! resolute session clear --key admin        # Remove one stored session
//! resolute probe /events '#join' 'button:has-text("Join")'
//! resolute config --format json             # Resolved MODE/BASE_URL/timeouts
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(feature = "browser")]
pub mod browser;
mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    BrowserArgs, Cli, ColorArg, Commands, ConfigArgs, ConfigFormat, LoginArgs, MethodArg,
    ProbeArgs, SessionArgs, SessionClearArgs, SessionCommand, SessionKeyArgs, SessionStatusArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Printer;

/// Exit code for a command that could not run for lack of configuration
pub const SKIP_EXIT_CODE: u8 = 2;
