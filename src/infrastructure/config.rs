use crate::domain::time_layout::LayoutConfig;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CLIENT_JSON: &str = "client.json";
const SCHEMA_VERSION: u64 = 1;
const DEFAULT_PORT: u16 = 8767;
const LOCAL_HOST: &str = "127.0.0.1";

const ENV_BACKEND_URL: &[&str] = &["AION_BACKEND_URL", "CALENDAR_BACKEND_URL"];
const ENV_LOG_LEVEL: &[&str] = &["AION_LOG"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub schema: u64,
    /// Explicit backend address. When absent the client talks to the
    /// locally launched backend on `port`.
    #[serde(rename = "backendUrl", default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    pub port: u16,
    #[serde(rename = "logLevel")]
    pub log_level: String,
    pub session: SessionSettings,
    pub layout: LayoutConfig,
    pub launcher: LauncherSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    #[serde(rename = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "healthIntervalMs")]
    pub health_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 30,
            health_interval_ms: 3_000,
        }
    }
}

impl SessionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LauncherSettings {
    pub python: String,
    #[serde(rename = "scriptPath")]
    pub script_path: String,
    #[serde(rename = "environmentsDir", default, skip_serializing_if = "Option::is_none")]
    pub environments_dir: Option<String>,
    #[serde(rename = "environment", default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(rename = "processName")]
    pub process_name: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            script_path: "calendar_server.py".to_string(),
            environments_dir: None,
            environment: None,
            process_name: "calendar-server".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            backend_url: None,
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
            session: SessionSettings::default(),
            layout: LayoutConfig::default(),
            launcher: LauncherSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.port == 0 {
            return Err(InfraError::InvalidConfig("port must be > 0".to_string()));
        }
        if let Some(backend_url) = self.backend_url.as_deref() {
            if backend_url.trim().is_empty() {
                return Err(InfraError::InvalidConfig(
                    "backendUrl must not be empty".to_string(),
                ));
            }
            url::Url::parse(backend_url.trim()).map_err(|error| {
                InfraError::InvalidConfig(format!("invalid backendUrl '{backend_url}': {error}"))
            })?;
        }
        if self.session.max_attempts == 0 {
            return Err(InfraError::InvalidConfig(
                "session.maxAttempts must be > 0".to_string(),
            ));
        }
        if self.session.poll_interval_ms == 0 || self.session.health_interval_ms == 0 {
            return Err(InfraError::InvalidConfig(
                "session intervals must be > 0".to_string(),
            ));
        }
        self.layout.validate().map_err(InfraError::InvalidConfig)
    }

    /// Address the client talks to: `backendUrl` when set,
    /// otherwise the local backend on `port`.
    pub fn effective_backend_url(&self) -> String {
        match self.backend_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("http://{LOCAL_HOST}:{}", self.port),
        }
    }

    /// Applies environment overrides through `lookup` so tests can inject
    /// values without touching the process environment.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup_value(&lookup, ENV_BACKEND_URL) {
            self.backend_url = Some(url);
        }
        if let Some(level) = lookup_value(&lookup, ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        self
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CLIENT_JSON)
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_path(config_dir);
    if !path.exists() {
        save_config(config_dir, &ClientConfig::default())?;
    }
    Ok(())
}

pub fn save_config(config_dir: &Path, config: &ClientConfig) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(config)?;
    fs::write(config_path(config_dir), format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    let path = config_path(config_dir);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let config: ClientConfig = serde_json::from_value(parsed)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_from_env(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    load_config_from_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_config_from_lookup<F>(config_dir: &Path, lookup: F) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = load_config(config_dir)?.apply_overrides(lookup);
    config.validate()?;
    Ok(config)
}

fn lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TempDir;

    #[test]
    fn default_config_is_written_once_and_loads() {
        let temp = TempDir::new("config");
        ensure_default_config(temp.path()).expect("write defaults");

        let mut config = load_config(temp.path()).expect("load defaults");
        assert_eq!(config, ClientConfig::default());

        config.port = 9000;
        save_config(temp.path(), &config).expect("save config");
        ensure_default_config(temp.path()).expect("keep existing");
        assert_eq!(load_config(temp.path()).expect("reload").port, 9000);
    }

    #[test]
    fn load_rejects_unknown_schema() {
        let temp = TempDir::new("config-schema");
        fs::write(
            config_path(temp.path()),
            r#"{"schema": 2, "backendUrl": "http://localhost"}"#,
        )
        .expect("write config");

        match load_config(temp.path()) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("schema 2")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn overrides_prefer_first_non_empty_key() {
        let config = ClientConfig::default().apply_overrides(|key| match key {
            "AION_BACKEND_URL" => Some("  ".to_string()),
            "CALENDAR_BACKEND_URL" => Some("http://10.0.0.2:9000".to_string()),
            "AION_LOG" => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.effective_backend_url(), "http://10.0.0.2:9000");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn backend_url_follows_port_unless_set() {
        let temp = TempDir::new("config-port");
        let mut config = ClientConfig::default();
        assert_eq!(config.effective_backend_url(), "http://127.0.0.1:8767");

        config.port = 9100;
        save_config(temp.path(), &config).expect("save config");
        let loaded = load_config(temp.path()).expect("reload");
        assert_eq!(loaded.backend_url, None);
        assert_eq!(loaded.effective_backend_url(), "http://127.0.0.1:9100");

        config.backend_url = Some("http://calendar.lan:8080".to_string());
        assert_eq!(config.effective_backend_url(), "http://calendar.lan:8080");
    }

    #[test]
    fn validate_rejects_blank_or_malformed_backend_url() {
        let mut config = ClientConfig::default();
        config.backend_url = Some("   ".to_string());
        assert!(config.validate().is_err());

        config.backend_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_attempts_and_inverted_layout() {
        let mut config = ClientConfig::default();
        config.session.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.layout.end_hour = 5;
        assert!(config.validate().is_err());
    }
}
