//! Gateway configuration.
//!
//! Two layers live here:
//! - `GatewayConfig`: the read-only settings every request is built from
//!   (origin, base path, timeout, default headers).
//! - `Settings`: the optional user file at
//!   `~/.config/trading-journal/config.json` that seeds `GatewayConfig`.
//!
//! The base path is resolved once per process from the deployment
//! environment and never changes afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "trading-journal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Root path of the backend API in production builds.
const PRODUCTION_BASE_URL: &str = "/api";

/// Root path of the backend API in development builds.
/// Same as production: the dev server proxies `/api` to the backend.
const DEVELOPMENT_BASE_URL: &str = "/api";

/// Request timeout in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Where the backend listens when nothing else is configured.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5000";

/// Environment variable selecting the deployment environment.
pub const ENV_VAR: &str = "JOURNAL_ENV";

/// Legacy environment variable still set by the backend's deployment scripts.
pub const LEGACY_ENV_VAR: &str = "FLASK_ENV";

/// Environment variable overriding the configured origin.
pub const ORIGIN_ENV_VAR: &str = "JOURNAL_API_ORIGIN";

static BASE_URL: OnceLock<&'static str> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Read the environment from `JOURNAL_ENV`, falling back to `FLASK_ENV`.
    /// Returns `None` when neither is set to a recognised value.
    pub fn from_env_vars() -> Option<Self> {
        let primary = std::env::var(ENV_VAR).ok();
        let legacy = std::env::var(LEGACY_ENV_VAR).ok();
        Self::from_values(primary.as_deref(), legacy.as_deref())
    }

    /// First recognised value of `primary`, then `legacy`. An unrecognised
    /// primary value falls through to the legacy one.
    pub fn from_values(primary: Option<&str>, legacy: Option<&str>) -> Option<Self> {
        [primary, legacy]
            .into_iter()
            .flatten()
            .find_map(|value| value.parse().ok())
    }

    /// Like `from_env_vars`, defaulting to development.
    pub fn from_env() -> Self {
        Self::from_env_vars().unwrap_or_default()
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Map an environment to the API root path.
pub fn resolve_base_url(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => PRODUCTION_BASE_URL,
        Environment::Development => DEVELOPMENT_BASE_URL,
    }
}

/// Resolve the API root for `environment` and cache it for the process.
/// The first call wins; later calls return the cached value whatever
/// environment they pass.
pub fn init_base_url(environment: Environment) -> &'static str {
    BASE_URL.get_or_init(|| resolve_base_url(environment))
}

/// The process-wide API root path. Resolved from the environment variables
/// if nothing has initialised it yet.
pub fn base_url() -> &'static str {
    init_base_url(Environment::from_env())
}

/// Where credentials are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    Keyring,
    File,
}

/// User-editable settings file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub origin: Option<String>,
    pub environment: Option<Environment>,
    pub credential_backend: Option<CredentialBackend>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

/// Read-only request settings shared by every call a client makes.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    environment: Environment,
    origin: String,
    base_url: &'static str,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl GatewayConfig {
    pub fn new(environment: Environment, origin: &str) -> Result<Self> {
        let origin = origin.trim().trim_end_matches('/');
        let parsed = Url::parse(origin).with_context(|| format!("Invalid API origin: {}", origin))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API origin must be http or https: {}", origin);
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            environment,
            origin: origin.to_string(),
            base_url: init_base_url(environment),
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            default_headers,
        })
    }

    /// Build from the process environment alone.
    pub fn from_env() -> Result<Self> {
        Self::from_settings(&Settings::default())
    }

    /// Build from a settings file, with environment variables taking
    /// precedence over file values.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let environment = select_environment(Environment::from_env_vars(), settings);
        let origin = select_origin(std::env::var(ORIGIN_ENV_VAR).ok(), settings);
        Self::new(environment, &origin)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn base_url(&self) -> &'static str {
        self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Absolute URL for a path relative to the API root.
    pub fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}{}", self.origin, self.base_url)
        } else {
            format!("{}{}/{}", self.origin, self.base_url, path)
        }
    }

    /// Absolute URL for a path relative to the origin, outside the API root.
    pub fn origin_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.origin, path.trim_start_matches('/'))
    }
}

/// Environment variables win over the settings file; development otherwise.
fn select_environment(from_vars: Option<Environment>, settings: &Settings) -> Environment {
    from_vars.or(settings.environment).unwrap_or_default()
}

/// `JOURNAL_API_ORIGIN` wins over the settings file; `DEFAULT_ORIGIN` otherwise.
fn select_origin(from_var: Option<String>, settings: &Settings) -> String {
    from_var
        .filter(|origin| !origin.trim().is_empty())
        .or_else(|| settings.origin.clone())
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
}
