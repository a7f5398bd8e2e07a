//! Environment profiles, credentials and tuning.
//!
//! Configuration is layered: profile defaults (selected by `MODE`), then an
//! optional YAML file, then environment overrides. Credentials only come from
//! the environment. Lookups go through an injectable closure so tests never
//! touch the process environment.

use crate::action::Actions;
use crate::backoff::RetryPolicy;
use crate::evidence::ArtifactDirs;
use crate::resolve::Resolver;
use crate::session::FileSessionStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent; dependent scenarios skip
    #[error("Missing configuration: {name}")]
    Missing {
        /// Variable or key name
        name: String,
    },

    /// Unknown `MODE` value
    #[error("Unknown profile '{value}' (expected dev, staging or production)")]
    InvalidProfile {
        /// Value given
        value: String,
    },

    /// Malformed value
    #[error("Invalid value for {name}: {message}")]
    Invalid {
        /// Variable or key name
        name: String,
        /// Error message
        message: String,
    },

    /// Config file could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a missing-setting error
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    /// Whether the error means "cannot run" rather than "broken"
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Environment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Local development server
    #[default]
    Dev,
    /// Staging deployment
    Staging,
    /// Production deployment
    Production,
}

impl Profile {
    /// Profile name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Built-in base URL, when the profile has one
    #[must_use]
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Dev => Some("http://localhost:3000"),
            Self::Staging | Self::Production => None,
        }
    }

    /// Timeout tuning for the profile
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        match self {
            Self::Dev | Self::Staging => Timeouts::DEFAULT,
            Self::Production => Timeouts {
                candidate_ms: 2000,
                ..Timeouts::DEFAULT
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "dev" | "development" | "local" => Ok(Self::Dev),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidProfile {
                value: other.to_string(),
            }),
        }
    }
}

/// Wait budgets, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Per-candidate probe
    pub candidate_ms: u64,
    /// Per-attempt visibility check in action primitives
    pub visibility_ms: u64,
    /// Pause between scroll and click
    pub settle_ms: u64,
    /// Popup appearance
    pub popup_ms: u64,
    /// Popup close after submit
    pub popup_close_ms: u64,
    /// Navigation
    pub navigation_ms: u64,
    /// Network idle after login
    pub network_idle_ms: u64,
}

impl Timeouts {
    /// Stock values
    pub const DEFAULT: Self = Self {
        candidate_ms: 1500,
        visibility_ms: 5000,
        settle_ms: 300,
        popup_ms: 60_000,
        popup_close_ms: 15_000,
        navigation_ms: 30_000,
        network_idle_ms: 30_000,
    };

    /// Per-candidate probe
    #[must_use]
    pub const fn candidate(&self) -> Duration {
        Duration::from_millis(self.candidate_ms)
    }

    /// Per-attempt visibility check
    #[must_use]
    pub const fn visibility(&self) -> Duration {
        Duration::from_millis(self.visibility_ms)
    }

    /// Settle delay
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Popup appearance
    #[must_use]
    pub const fn popup(&self) -> Duration {
        Duration::from_millis(self.popup_ms)
    }

    /// Popup close
    #[must_use]
    pub const fn popup_close(&self) -> Duration {
        Duration::from_millis(self.popup_close_ms)
    }

    /// Navigation
    #[must_use]
    pub const fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    /// Network idle
    #[must_use]
    pub const fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Inbox service settings for OTP retrieval
#[derive(Clone, PartialEq, Eq)]
pub struct MailosaurSettings {
    /// API key
    pub api_key: String,
    /// Server id
    pub server_id: String,
}

impl fmt::Debug for MailosaurSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailosaurSettings")
            .field("api_key", &"***")
            .field("server_id", &self.server_id)
            .finish()
    }
}

/// Optional overrides read from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Profile, when `MODE` is unset
    pub profile: Option<Profile>,
    /// Base URL
    pub base_url: Option<String>,
    /// Timeout overrides
    pub timeouts: Option<Timeouts>,
    /// Action primitive retries
    pub action_retry: Option<RetryPolicy>,
    /// Login retries
    pub auth_retry: Option<RetryPolicy>,
    /// Artifact root
    pub artifacts_dir: Option<PathBuf>,
    /// Session directory
    pub session_dir: Option<PathBuf>,
    /// Storage keys removed between login attempts
    pub reset_storage_keys: Option<Vec<String>>,
}

impl ConfigFile {
    /// Parse YAML text
    pub fn from_yaml(text: &str, path: &Path) -> ConfigResult<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a YAML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text, path)
    }
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentConfig {
    /// Active profile
    pub profile: Profile,
    /// Application root URL, without trailing slash
    pub base_url: String,
    /// Wait budgets
    pub timeouts: Timeouts,
    /// Action primitive retries
    pub action_retry: RetryPolicy,
    /// Login retries
    pub auth_retry: RetryPolicy,
    /// Artifact root
    pub artifacts_dir: PathBuf,
    /// Session directory
    pub session_dir: PathBuf,
    /// Storage keys removed between login attempts
    pub reset_storage_keys: Vec<String>,
    /// Google account
    #[serde(skip)]
    pub google: Option<Credentials>,
    /// Direct application account
    #[serde(skip)]
    pub liveshare: Option<Credentials>,
    /// Inbox service
    #[serde(skip)]
    pub mailosaur: Option<MailosaurSettings>,
}

/// Storage keys cleared between login attempts unless configured
pub const DEFAULT_RESET_STORAGE_KEYS: &[&str] = &["user", "token", "auth"];

impl EnvironmentConfig {
    /// Build from the process environment
    pub fn from_env(file: Option<&Path>) -> ConfigResult<Self> {
        let file = file.map(ConfigFile::load).transpose()?;
        Self::build(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Build from a config file and an environment lookup
    pub fn build<F>(file: ConfigFile, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match get("MODE") {
            Some(mode) => mode.parse()?,
            None => file.profile.unwrap_or_default(),
        };

        let base_url = get("BASE_URL")
            .or(file.base_url)
            .or_else(|| profile.default_base_url().map(str::to_string))
            .ok_or_else(|| ConfigError::missing("BASE_URL"))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "BASE_URL".to_string(),
                message: format!("'{base_url}' is not an http(s) URL"),
            });
        }

        let pair = |user: &str, pass: &str| match (get(user), get(pass)) {
            (Some(email), Some(password)) => Some(Credentials::new(email, password)),
            _ => None,
        };
        let mailosaur = match (get("MAILOSAUR_API_KEY"), get("MAILOSAUR_SERVER_ID")) {
            (Some(api_key), Some(server_id)) => Some(MailosaurSettings { api_key, server_id }),
            _ => None,
        };

        Ok(Self {
            profile,
            base_url,
            timeouts: file.timeouts.unwrap_or_else(|| profile.timeouts()),
            action_retry: file.action_retry.unwrap_or_else(RetryPolicy::actions),
            auth_retry: file.auth_retry.unwrap_or_else(RetryPolicy::authentication),
            artifacts_dir: file.artifacts_dir.unwrap_or_else(|| PathBuf::from(".")),
            session_dir: file.session_dir.unwrap_or_else(|| PathBuf::from("auth")),
            reset_storage_keys: file.reset_storage_keys.unwrap_or_else(|| {
                DEFAULT_RESET_STORAGE_KEYS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            google: pair("GOOGLE_EMAIL", "GOOGLE_PASSWORD"),
            liveshare: pair("LIVESHARE_EMAIL", "LIVESHARE_PASSWORD"),
            mailosaur,
        })
    }

    /// Absolute URL for an application path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.is_empty() || path == "/" {
            return format!("{}/", self.base_url);
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Google credentials, or a skip
    pub fn require_google(&self) -> ConfigResult<&Credentials> {
        self.google
            .as_ref()
            .ok_or_else(|| ConfigError::missing("GOOGLE_EMAIL/GOOGLE_PASSWORD"))
    }

    /// Application credentials, or a skip
    pub fn require_liveshare(&self) -> ConfigResult<&Credentials> {
        self.liveshare
            .as_ref()
            .ok_or_else(|| ConfigError::missing("LIVESHARE_EMAIL/LIVESHARE_PASSWORD"))
    }

    /// Inbox settings, or a skip
    pub fn require_mailosaur(&self) -> ConfigResult<&MailosaurSettings> {
        self.mailosaur
            .as_ref()
            .ok_or_else(|| ConfigError::missing("MAILOSAUR_API_KEY/MAILOSAUR_SERVER_ID"))
    }

    /// Resolver tuned by this config
    #[must_use]
    pub const fn resolver(&self) -> Resolver {
        Resolver::new()
            .with_timeout(self.timeouts.candidate())
            .with_navigation_timeout(self.timeouts.navigation())
    }

    /// Action primitives tuned by this config
    #[must_use]
    pub fn actions(&self) -> Actions {
        Actions::new(self.action_retry)
            .with_visibility_timeout(self.timeouts.visibility())
            .with_settle(self.timeouts.settle())
            .with_resolver(self.resolver())
            .with_artifacts(self.artifacts())
    }

    /// Artifact directories
    #[must_use]
    pub fn artifacts(&self) -> ArtifactDirs {
        ArtifactDirs::new(self.artifacts_dir.clone())
    }

    /// File session store under the session directory
    #[must_use]
    pub fn session_store(&self) -> FileSessionStore {
        FileSessionStore::new(self.session_dir.clone())
    }
}
