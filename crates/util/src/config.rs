//! Client configuration for the Testbench CLI/TUI.
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! file in the standard configuration directory
//! (`~/.config/testbench/config.json` on most platforms), and environment
//! variables. Later layers win. A missing file is fine; a malformed one is
//! reported so that typos do not silently fall back to defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Environment variable overriding the REST base URL.
pub const API_URL_ENV: &str = "TESTBENCH_API_URL";
/// Environment variable overriding the stream base URL.
pub const WS_URL_ENV: &str = "TESTBENCH_WS_URL";
/// Environment variable carrying a bearer token.
pub const API_TOKEN_ENV: &str = "TESTBENCH_API_TOKEN";
/// Environment variable overriding the request timeout in seconds.
pub const REQUEST_TIMEOUT_ENV: &str = "TESTBENCH_REQUEST_TIMEOUT";
/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "TESTBENCH_CONFIG_PATH";

/// Default filename inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_API_URL: &str = "http://localhost:8090/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8090/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Hostnames allowed to use plain `http`/`ws`.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Error surfaced when configuration cannot be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {name} '{value}': {reason}")]
    InvalidUrl { name: &'static str, value: String, reason: String },
    #[error("invalid {name} '{value}': expected a whole number of seconds")]
    InvalidTimeout { name: &'static str, value: String },
}

/// Optional values read from the JSON config file.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConfigFile {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_url: String,
    /// Base URL of the run stream, without a trailing slash.
    pub ws_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    /// Directory used for the log file and other client state.
    pub state_dir: PathBuf,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url)
            .field("ws_url", &self.ws_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            state_dir: default_state_dir(),
        }
    }
}

impl PlatformConfig {
    /// Loads defaults, then the config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        let file = read_config_file(&path)?;
        let mut config = Self::default();
        config.apply_file(file);
        config.apply_env()?;
        config.validate()?;
        debug!(api_url = %config.api_url, ws_url = %config.ws_url, path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Overrides URLs supplied on the command line and re-validates.
    pub fn with_overrides(mut self, api_url: Option<String>, ws_url: Option<String>) -> Result<Self, ConfigError> {
        if let Some(api_url) = api_url {
            self.api_url = trim_base(&api_url);
        }
        if let Some(ws_url) = ws_url {
            self.ws_url = trim_base(&ws_url);
        }
        self.validate()?;
        Ok(self)
    }

    /// Path of the client log file used while the terminal UI is active.
    pub fn log_file_path(&self) -> PathBuf {
        self.state_dir.join("testbench.log")
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(api_url) = file.api_url {
            self.api_url = trim_base(&api_url);
        }
        if let Some(ws_url) = file.ws_url {
            self.ws_url = trim_base(&ws_url);
        }
        if file.api_token.is_some() {
            self.api_token = file.api_token;
        }
        if let Some(seconds) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(seconds);
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(api_url) = non_empty_env(API_URL_ENV) {
            self.api_url = trim_base(&api_url);
        }
        if let Some(ws_url) = non_empty_env(WS_URL_ENV) {
            self.ws_url = trim_base(&ws_url);
        }
        if let Some(token) = non_empty_env(API_TOKEN_ENV) {
            self.api_token = Some(token);
        }
        if let Some(timeout) = non_empty_env(REQUEST_TIMEOUT_ENV) {
            let seconds = timeout.parse::<u64>().map_err(|_| ConfigError::InvalidTimeout {
                name: REQUEST_TIMEOUT_ENV,
                value: timeout.clone(),
            })?;
            self.request_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("api_url", &self.api_url, &["http", "https"], "https")?;
        validate_base_url("ws_url", &self.ws_url, &["ws", "wss"], "wss")?;
        Ok(())
    }
}

/// Validates a base URL.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any of the `allowed` schemes
/// - otherwise: only the `secure` scheme
pub fn validate_base_url(name: &'static str, base: &str, allowed: &[&str], secure: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name,
        value: base.to_string(),
        reason,
    };

    let parsed = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    let host = parsed.host_str().ok_or_else(|| invalid("missing host".into()))?;
    let scheme = parsed.scheme();

    if !allowed.contains(&scheme) {
        return Err(invalid(format!("unsupported scheme '{scheme}'")));
    }

    let is_local = LOCALHOST_DOMAINS.iter().any(|local| host.eq_ignore_ascii_case(local));
    if !is_local && scheme != secure {
        return Err(invalid(format!("non-local hosts must use {secure}://")));
    }
    Ok(())
}

/// Resolves the config file path, honouring [`CONFIG_PATH_ENV`].
pub fn config_file_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }
    default_state_dir().join(CONFIG_FILE_NAME)
}

fn default_state_dir() -> PathBuf {
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("testbench")
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    match fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    match trimmed {
        "~" => home(),
        _ => match trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
            Some(rest) => home().join(rest),
            None => PathBuf::from(trimmed),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_env<F: FnOnce()>(config_path: &Path, vars: &[(&str, Option<&str>)], body: F) {
        let path = config_path.to_string_lossy().to_string();
        let mut all: Vec<(&str, Option<&str>)> = vec![
            (API_URL_ENV, None),
            (WS_URL_ENV, None),
            (API_TOKEN_ENV, None),
            (REQUEST_TIMEOUT_ENV, None),
            (CONFIG_PATH_ENV, Some(path.as_str())),
        ];
        for (name, value) in vars {
            all.retain(|(existing, _)| existing != name);
            all.push((*name, *value));
        }
        temp_env::with_vars(all, body);
    }

    #[test]
    fn defaults_apply_when_nothing_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        clean_env(&dir.path().join("missing.json"), &[], || {
            let config = PlatformConfig::load().expect("load defaults");
            assert_eq!(config.api_url, DEFAULT_API_URL);
            assert_eq!(config.ws_url, DEFAULT_WS_URL);
            assert_eq!(config.api_token, None);
            assert_eq!(config.request_timeout, Duration::from_secs(30));
        });
    }

    #[test]
    fn env_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"api_url": "http://localhost:9000/api/", "api_token": "from-file", "request_timeout_secs": 5}"#,
        )
        .unwrap();

        clean_env(&path, &[(API_TOKEN_ENV, Some("from-env"))], || {
            let config = PlatformConfig::load().expect("load config");
            assert_eq!(config.api_url, "http://localhost:9000/api");
            assert_eq!(config.api_token.as_deref(), Some("from-env"));
            assert_eq!(config.request_timeout, Duration::from_secs(5));
        });
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        clean_env(&path, &[], || {
            assert!(matches!(PlatformConfig::load(), Err(ConfigError::Parse { .. })));
        });
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        clean_env(&dir.path().join("missing.json"), &[(REQUEST_TIMEOUT_ENV, Some("soon"))], || {
            assert!(matches!(PlatformConfig::load(), Err(ConfigError::InvalidTimeout { .. })));
        });
    }

    #[test]
    fn remote_hosts_require_secure_schemes() {
        assert!(validate_base_url("api_url", "http://localhost:8090/api", &["http", "https"], "https").is_ok());
        assert!(validate_base_url("api_url", "https://tests.example.com/api", &["http", "https"], "https").is_ok());
        assert!(validate_base_url("api_url", "http://tests.example.com/api", &["http", "https"], "https").is_err());
        assert!(validate_base_url("ws_url", "ws://127.0.0.1:8090/api", &["ws", "wss"], "wss").is_ok());
        assert!(validate_base_url("ws_url", "https://tests.example.com", &["ws", "wss"], "wss").is_err());
    }

    #[test]
    fn command_line_overrides_are_validated() {
        let config = PlatformConfig::default();
        assert!(config.clone().with_overrides(Some("ftp://localhost/api".into()), None).is_err());
        let updated = config.with_overrides(None, Some("wss://stream.example.com/api/".into())).unwrap();
        assert_eq!(updated.ws_url, "wss://stream.example.com/api");
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = PlatformConfig {
            api_token: Some("secret-token".into()),
            ..PlatformConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
