//! Application configuration
//!
//! Defaults are embedded from `config.toml` at build time. A `.env` file and the
//! process environment can override the API endpoint, token and draft directory.

use crate::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable overriding `api.base_url`
pub const ENV_API_URL: &str = "TRANSCRIPT_API_URL";

/// Environment variable carrying the API bearer token
pub const ENV_API_TOKEN: &str = "TRANSCRIPT_API_TOKEN";

/// Environment variable overriding the draft directory
pub const ENV_DRAFT_DIR: &str = "TRANSCRIPT_DRAFT_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub gate: GateConfig,
    pub drafts: DraftConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateConfig {
    /// Time an unassigned segment may play before playback is paused
    pub assignment_deadline_secs: f64,
    /// How far past its start an unassigned segment may be played or seeked
    pub forward_window_secs: f64,
    pub tick_interval_ms: u64,
    /// Lifetime of a gate notice before it is dismissed
    pub notice_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub debounce_ms: u64,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            assignment_deadline_secs: 10.0,
            forward_window_secs: 10.0,
            tick_interval_ms: 100,
            notice_duration_ms: 4000,
        }
    }
}

impl GateConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn notice_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.notice_duration_ms as i64)
    }
}

impl DraftConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load the embedded configuration and apply `.env`/environment overrides.
    pub fn load() -> Result<Self, AppError> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let mut config = Self::from_toml(CONFIG_TOML)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        info!(base_url = %config.api.base_url, "Loaded configuration");
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| AppError::Config(format!("invalid config.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(dir) = lookup(ENV_DRAFT_DIR).filter(|v| !v.is_empty()) {
            self.drafts.directory = Some(PathBuf::from(dir));
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| AppError::Config(format!("api.base_url is not a URL: {e}")))?;
        if self.gate.assignment_deadline_secs <= 0.0 || self.gate.forward_window_secs <= 0.0 {
            return Err(AppError::Config(
                "gate windows must be positive durations".to_string(),
            ));
        }
        if self.gate.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "gate.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_embedded_config_parses() {
        let config = Config::from_toml(CONFIG_TOML).expect("embedded config");
        assert_eq!(config.gate.assignment_deadline_secs, 10.0);
        assert_eq!(config.gate.forward_window_secs, 10.0);
        assert_eq!(config.gate.tick_interval(), Duration::from_millis(100));
        assert!(config.api.token.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::from_toml(CONFIG_TOML).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "https://annotate.example.com/api"),
            (ENV_API_TOKEN, "secret"),
            (ENV_DRAFT_DIR, ""),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://annotate.example.com/api");
        assert_eq!(config.api.token.as_deref(), Some("secret"));
        assert!(config.drafts.directory.is_none());
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let raw = CONFIG_TOML.replace("http://localhost:3000/api", "not a url");
        assert!(matches!(Config::from_toml(&raw), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_tick_interval() {
        let raw = CONFIG_TOML.replace("tick_interval_ms = 100", "tick_interval_ms = 0");
        assert!(Config::from_toml(&raw).is_err());
    }
}
