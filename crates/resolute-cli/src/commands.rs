//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use resolute::{worker_key, AuthMethod};
use std::path::PathBuf;

/// Resolute: run logins, inspect persisted sessions and probe locators
#[derive(Parser, Debug)]
#[command(name = "resolute")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// YAML file with profile, timeout and retry overrides
    #[arg(long, env = "RESOLUTE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in through the UI and persist the session
    Login(LoginArgs),

    /// Inspect or clear persisted sessions
    Session(SessionArgs),

    /// Resolve candidate locators against a live page
    Probe(ProbeArgs),

    /// Show the resolved environment configuration
    Config(ConfigArgs),
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Browser launch flags shared by commands that drive a page
#[derive(Args, Debug, Clone, Default)]
pub struct BrowserArgs {
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium executable
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium: Option<PathBuf>,
}

/// Selects one session key
#[derive(Args, Debug, Clone, Default)]
pub struct SessionKeyArgs {
    /// Explicit session key
    #[arg(long, conflicts_with = "worker")]
    pub key: Option<String>,

    /// Parallel worker index; each worker gets its own session file
    #[arg(short, long)]
    pub worker: Option<usize>,
}

impl SessionKeyArgs {
    /// Key to load or store under
    #[must_use]
    pub fn resolve(&self) -> String {
        self.key.clone().unwrap_or_else(|| worker_key(self.worker))
    }
}

/// Login method argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodArg {
    /// Identity provider popup
    #[default]
    Google,
    /// The application's own email/password form
    Email,
}

impl From<MethodArg> for AuthMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Google => Self::GoogleOAuth,
            MethodArg::Email => Self::EmailPassword,
        }
    }
}

/// Arguments for the login command
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Login method
    #[arg(short, long, default_value = "google")]
    pub method: MethodArg,

    /// Session key selection
    #[command(flatten)]
    pub session: SessionKeyArgs,

    /// Log in even if a fresh session is stored
    #[arg(long)]
    pub force: bool,

    /// Capture the bearer token from responses whose URL contains this
    #[arg(long)]
    pub token_url: Option<String>,

    /// Where to write the captured token
    #[arg(long, default_value = "auth/token.json", requires = "token_url")]
    pub token_out: PathBuf,

    /// Browser flags
    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Arguments for the session command
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// Session directory (defaults to the configured one)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Session subcommand
    #[command(subcommand)]
    pub command: SessionCommand,
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show age and freshness of stored sessions
    Status(SessionStatusArgs),

    /// Remove stored sessions
    Clear(SessionClearArgs),
}

/// Arguments for `session status`
#[derive(Parser, Debug)]
pub struct SessionStatusArgs {
    /// Limit to one key
    #[command(flatten)]
    pub session: SessionKeyArgs,

    /// Show every stored session
    #[arg(long)]
    pub all: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `session clear`
#[derive(Parser, Debug)]
pub struct SessionClearArgs {
    /// Key to remove
    #[command(flatten)]
    pub session: SessionKeyArgs,

    /// Remove every stored session
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the probe command
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Page to open; a path is joined to the base URL
    pub url: String,

    /// Candidate locators in priority order
    #[arg(required = true, num_args = 1..)]
    pub candidates: Vec<String>,

    /// Per-candidate timeout in milliseconds (defaults to the profile's)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Click the winning candidate
    #[arg(long)]
    pub click: bool,

    /// Save a screenshot after probing
    #[arg(long)]
    pub screenshot: bool,

    /// Browser flags
    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Config output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    #[default]
    Yaml,
    /// JSON
    Json,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_login_defaults() {
            let cli = Cli::parse_from(["resolute", "login"]);
            if let Commands::Login(args) = cli.command {
                assert_eq!(args.method, MethodArg::Google);
                assert_eq!(args.session.resolve(), "user-auth");
                assert!(!args.force);
                assert!(!args.browser.headed);
            } else {
                panic!("expected Login command");
            }
        }

        #[test]
        fn test_parse_login_with_worker() {
            let cli = Cli::parse_from(["resolute", "login", "--method", "email", "-w", "3"]);
            if let Commands::Login(args) = cli.command {
                assert_eq!(AuthMethod::from(args.method), AuthMethod::EmailPassword);
                assert_eq!(args.session.resolve(), "user-auth-w3");
            } else {
                panic!("expected Login command");
            }
        }

        #[test]
        fn test_key_conflicts_with_worker() {
            let result =
                Cli::try_parse_from(["resolute", "login", "--key", "admin", "--worker", "1"]);
            assert!(result.is_err());
        }

        #[test]
        fn test_token_out_requires_token_url() {
            let result = Cli::try_parse_from(["resolute", "login", "--token-out", "t.json"]);
            assert!(result.is_err());
        }

        #[test]
        fn test_parse_session_status() {
            let cli = Cli::parse_from(["resolute", "session", "status", "--all", "--json"]);
            if let Commands::Session(args) = cli.command {
                assert!(args.dir.is_none());
                if let SessionCommand::Status(status) = args.command {
                    assert!(status.all);
                    assert!(status.json);
                } else {
                    panic!("expected Status subcommand");
                }
            } else {
                panic!("expected Session command");
            }
        }

        #[test]
        fn test_parse_session_clear_with_dir() {
            let cli = Cli::parse_from(["resolute", "session", "clear", "--dir", "tmp/auth", "--key", "admin"]);
            if let Commands::Session(args) = cli.command {
                assert_eq!(args.dir, Some(PathBuf::from("tmp/auth")));
                if let SessionCommand::Clear(clear) = args.command {
                    assert_eq!(clear.session.resolve(), "admin");
                    assert!(!clear.all);
                } else {
                    panic!("expected Clear subcommand");
                }
            } else {
                panic!("expected Session command");
            }
        }

        #[test]
        fn test_parse_probe() {
            let cli = Cli::parse_from([
                "resolute",
                "probe",
                "/events",
                "#missing",
                "button:has-text(\"Join\")",
                "--timeout-ms",
                "500",
                "--click",
            ]);
            if let Commands::Probe(args) = cli.command {
                assert_eq!(args.url, "/events");
                assert_eq!(args.candidates.len(), 2);
                assert_eq!(args.timeout_ms, Some(500));
                assert!(args.click);
            } else {
                panic!("expected Probe command");
            }
        }

        #[test]
        fn test_probe_requires_candidates() {
            assert!(Cli::try_parse_from(["resolute", "probe", "/events"]).is_err());
        }

        #[test]
        fn test_parse_config_json() {
            let cli = Cli::parse_from(["resolute", "config", "--format", "json"]);
            if let Commands::Config(args) = cli.command {
                assert_eq!(args.format, ConfigFormat::Json);
            } else {
                panic!("expected Config command");
            }
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from(["resolute", "-vv", "--color", "never", "config"]);
            assert_eq!(cli.verbose, 2);
            assert_eq!(cli.color, ColorArg::Never);
            assert!(!cli.quiet);
        }
    }
}
