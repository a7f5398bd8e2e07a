//! Config command handler

use crate::commands::{ConfigArgs, ConfigFormat};
use crate::error::{CliError, CliResult};
use crate::output::Printer;
use resolute::EnvironmentConfig;
use serde::Serialize;

/// Which secret groups are configured; values are never shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialPresence {
    /// `GOOGLE_EMAIL` / `GOOGLE_PASSWORD`
    pub google: bool,
    /// `LIVESHARE_EMAIL` / `LIVESHARE_PASSWORD`
    pub liveshare: bool,
    /// `MAILOSAUR_API_KEY` / `MAILOSAUR_SERVER_ID`
    pub mailosaur: bool,
}

/// Printable view of a resolved environment
#[derive(Debug, Serialize)]
pub struct ConfigView<'a> {
    /// Resolved settings
    #[serde(flatten)]
    pub environment: &'a EnvironmentConfig,
    /// Secret groups present
    pub credentials: CredentialPresence,
}

impl<'a> ConfigView<'a> {
    /// View of `environment`
    #[must_use]
    pub const fn new(environment: &'a EnvironmentConfig) -> Self {
        Self {
            environment,
            credentials: CredentialPresence {
                google: environment.google.is_some(),
                liveshare: environment.liveshare.is_some(),
                mailosaur: environment.mailosaur.is_some(),
            },
        }
    }
}

/// Serialize `environment` in `format`
pub fn render_config(environment: &EnvironmentConfig, format: ConfigFormat) -> CliResult<String> {
    let view = ConfigView::new(environment);
    match format {
        ConfigFormat::Yaml => {
            serde_yaml_ng::to_string(&view).map_err(|e| CliError::config(e.to_string()))
        }
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(&view)?),
    }
}

/// Execute the config command
pub fn execute_config(
    printer: &Printer,
    environment: &EnvironmentConfig,
    args: &ConfigArgs,
) -> CliResult<()> {
    printer.raw(&render_config(environment, args.format)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use resolute::ConfigFile;
    use std::collections::HashMap;

    fn environment(pairs: &[(&str, &str)]) -> EnvironmentConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EnvironmentConfig::build(ConfigFile::default(), |key| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_yaml_shows_profile_and_base_url() {
        let env = environment(&[("MODE", "dev")]);
        let yaml = render_config(&env, ConfigFormat::Yaml).unwrap();
        assert!(yaml.contains("profile: dev"));
        assert!(yaml.contains("localhost:3000"));
        assert!(yaml.contains("credentials:"));
    }

    #[test]
    fn test_json_reports_presence_without_secrets() {
        let env = environment(&[
            ("MODE", "staging"),
            ("BASE_URL", "https://staging.app.test/"),
            ("GOOGLE_EMAIL", "qa@example.test"),
            ("GOOGLE_PASSWORD", "hunter2"),
        ]);
        let json = render_config(&env, ConfigFormat::Json).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("qa@example.test"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["base_url"], "https://staging.app.test");
        assert_eq!(value["credentials"]["google"], true);
        assert_eq!(value["credentials"]["mailosaur"], false);
    }
}
