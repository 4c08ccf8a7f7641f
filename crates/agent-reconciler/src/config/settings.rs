use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/grafana-agent.yaml";
pub const DEFAULT_RELOAD_URL: &str = "http://localhost/-/reload";

const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

/// How a changed configuration is picked up by the running agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStrategy {
    /// Restart the agent service.
    #[default]
    Restart,
    /// POST to the agent's reload endpoint.
    Reload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_charm_dir")]
    pub charm_dir: PathBuf,
    #[serde(default)]
    pub apply: ApplyStrategy,
    #[serde(default)]
    pub reload: ReloadSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_charm_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tls_insecure_skip_verify: false,
            log_level: default_log_level(),
            config_path: default_config_path(),
            charm_dir: default_charm_dir(),
            apply: ApplyStrategy::default(),
            reload: ReloadSettings::default(),
        }
    }
}

impl Settings {
    /// Command-line arguments the agent is started with.
    pub fn cli_args(&self) -> String {
        format!("-config.file={}", self.config_path.display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSettings {
    #[serde(default = "default_reload_url")]
    pub url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor_ms")]
    pub backoff_factor_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_reload_url() -> String {
    DEFAULT_RELOAD_URL.to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_factor_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    120_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            url: default_reload_url(),
            max_attempts: default_max_attempts(),
            backoff_factor_ms: default_backoff_factor_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ReloadSettings {
    pub fn backoff_factor(&self) -> Duration {
        Duration::from_millis(self.backoff_factor_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, SettingsError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, SettingsError> {
    // An empty document means "all defaults".
    let settings: Settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if !LOG_LEVELS.contains(&settings.log_level.as_str()) {
        return Err(SettingsError::Validation {
            message: format!(
                "Unsupported log level '{}', expected one of {}",
                settings.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if settings.reload.max_attempts == 0 {
        return Err(SettingsError::Validation {
            message: "reload.max_attempts must be at least 1".to_string(),
        });
    }

    let url = reqwest::Url::parse(&settings.reload.url).map_err(|e| SettingsError::Validation {
        message: format!("Invalid reload URL '{}': {}", settings.reload.url, e),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SettingsError::Validation {
            message: format!("Reload URL must be http(s), got '{}'", url.scheme()),
        });
    }

    if settings.config_path.as_os_str().is_empty() {
        return Err(SettingsError::Validation {
            message: "config_path must not be empty".to_string(),
        });
    }

    Ok(())
}
