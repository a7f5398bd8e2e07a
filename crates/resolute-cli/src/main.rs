//! Resolute CLI: run logins, inspect persisted sessions and probe locators
//!
//! ## Usage
//!
//! ```bash
//! resolute login                      # Log in and persist auth/user-auth.json
//! resolute session status --all       # Freshness of every stored session
//! resolute probe /events '#join'      # Which candidate resolves on the page
//! resolute config                     # Resolved environment, secrets masked
//! ```

use chrono::Utc;
use clap::Parser;
use resolute::EnvironmentConfig;
use resolute_cli::handlers::{execute_config, execute_session};
use resolute_cli::{
    Cli, CliConfig, CliResult, ColorChoice, Commands, Printer, SessionArgs, Verbosity,
    SKIP_EXIT_CODE,
};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);
    let printer = Printer::new(config.color.should_color(), config.verbosity.is_quiet());

    match run(cli, &printer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_skip() => {
            printer.skipped(&e.to_string());
            ExitCode::from(SKIP_EXIT_CODE)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(ColorChoice::from(cli.color))
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_verbose())
        .init();
}

fn run(cli: Cli, printer: &Printer) -> CliResult<()> {
    let file = cli.config.as_deref();
    match cli.command {
        Commands::Login(args) => run_login(printer, file, &args),
        Commands::Session(args) => run_session(printer, file, &args),
        Commands::Probe(args) => run_probe(printer, file, &args),
        Commands::Config(args) => execute_config(printer, &EnvironmentConfig::from_env(file)?, &args),
    }
}

fn run_session(printer: &Printer, file: Option<&Path>, args: &SessionArgs) -> CliResult<()> {
    let store = match &args.dir {
        Some(dir) => resolute::FileSessionStore::new(dir.clone()),
        None => EnvironmentConfig::from_env(file)?.session_store(),
    };
    execute_session(printer, &store, &args.command, Utc::now())
}

#[cfg(feature = "browser")]
fn runtime() -> CliResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

#[cfg(feature = "browser")]
fn run_login(
    printer: &Printer,
    file: Option<&Path>,
    args: &resolute_cli::LoginArgs,
) -> CliResult<()> {
    let environment = EnvironmentConfig::from_env(file)?;
    runtime()?.block_on(resolute_cli::browser::run_login(printer, &environment, args))
}

#[cfg(not(feature = "browser"))]
fn run_login(
    _printer: &Printer,
    _file: Option<&Path>,
    _args: &resolute_cli::LoginArgs,
) -> CliResult<()> {
    Err(resolute_cli::CliError::feature_disabled("login", "browser"))
}

#[cfg(feature = "browser")]
fn run_probe(
    printer: &Printer,
    file: Option<&Path>,
    args: &resolute_cli::ProbeArgs,
) -> CliResult<()> {
    let environment = EnvironmentConfig::from_env(file)?;
    runtime()?.block_on(resolute_cli::browser::run_probe(printer, &environment, args))
}

#[cfg(not(feature = "browser"))]
fn run_probe(
    _printer: &Printer,
    _file: Option<&Path>,
    _args: &resolute_cli::ProbeArgs,
) -> CliResult<()> {
    Err(resolute_cli::CliError::feature_disabled("probe", "browser"))
}
