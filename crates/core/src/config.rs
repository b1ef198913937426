use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "hearth.toml";
pub const DEFAULT_PROXY_BASE: &str = "http://localhost:3000";
pub const DEFAULT_SERVICE_BASE: &str = "http://localhost:3001";
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 45;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub endpoints: EndpointConfig,
    pub session: SessionConfig,
    pub watchdog: WatchdogConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Explicitly configured backend origin, tried first when present.
    pub api_base: Option<String>,
    /// Dev-proxy origin (the rendering host) tried before the service itself.
    pub proxy_base: String,
    /// Known default origin of the capability service, always last.
    pub service_base: String,
    /// Direct CRM snapshot webhook; bypasses the resolver when set.
    pub snapshot_webhook: Option<String>,
}

impl EndpointConfig {
    /// Ordered, deduplicated candidate origins for the resolver.
    pub fn candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();
        let mut push = |base: &str| {
            let trimmed = base.trim_end_matches('/').to_owned();
            if !trimmed.is_empty() && !candidates.contains(&trimmed) {
                candidates.push(trimmed);
            }
        };
        if let Some(base) = &self.api_base {
            push(base);
        }
        push(&self.proxy_base);
        push(&self.service_base);
        candidates
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct WatchdogConfig {
    pub turn_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub session_token: Option<String>,
    pub snapshot_webhook: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub turn_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig {
                api_base: None,
                proxy_base: DEFAULT_PROXY_BASE.to_owned(),
                service_base: DEFAULT_SERVICE_BASE.to_owned(),
                snapshot_webhook: None,
            },
            session: SessionConfig { token: None },
            watchdog: WatchdogConfig { turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    endpoints: FileEndpoints,
    #[serde(default)]
    session: FileSession,
    #[serde(default)]
    watchdog: FileWatchdog,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
struct FileEndpoints {
    api_base: Option<String>,
    proxy_base: Option<String>,
    service_base: Option<String>,
    snapshot_webhook: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSession {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileWatchdog {
    turn_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(file) = read_file_config(&options)? {
            config.apply_file(file);
        }
        config.apply_env()?;
        config.apply_overrides(&options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if file.endpoints.api_base.is_some() {
            self.endpoints.api_base = file.endpoints.api_base;
        }
        if let Some(proxy_base) = file.endpoints.proxy_base {
            self.endpoints.proxy_base = proxy_base;
        }
        if let Some(service_base) = file.endpoints.service_base {
            self.endpoints.service_base = service_base;
        }
        if file.endpoints.snapshot_webhook.is_some() {
            self.endpoints.snapshot_webhook = file.endpoints.snapshot_webhook;
        }
        if let Some(token) = file.session.token {
            self.session.token = Some(token.into());
        }
        if let Some(secs) = file.watchdog.turn_timeout_secs {
            self.watchdog.turn_timeout_secs = secs;
        }
        if let Some(level) = file.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = file.logging.format {
            self.logging.format = format;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("HEARTH_API_BASE") {
            self.endpoints.api_base = Some(value);
        }
        if let Ok(value) = env::var("HEARTH_SNAPSHOT_WEBHOOK") {
            self.endpoints.snapshot_webhook = Some(value);
        }
        if let Ok(value) = env::var("HEARTH_SESSION_TOKEN") {
            self.session.token = Some(value.into());
        }
        if let Ok(value) = env::var("HEARTH_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("HEARTH_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&value).ok_or(ConfigError::InvalidEnvOverride {
                key: "HEARTH_LOG_FORMAT".to_owned(),
                value,
            })?;
        }
        if let Ok(value) = env::var("HEARTH_TURN_TIMEOUT_SECS") {
            self.watchdog.turn_timeout_secs =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "HEARTH_TURN_TIMEOUT_SECS".to_owned(),
                    value,
                })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(api_base) = &overrides.api_base {
            self.endpoints.api_base = Some(api_base.clone());
        }
        if let Some(webhook) = &overrides.snapshot_webhook {
            self.endpoints.snapshot_webhook = Some(webhook.clone());
        }
        if let Some(token) = &overrides.session_token {
            self.session.token = Some(token.clone().into());
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(secs) = overrides.turn_timeout_secs {
            self.watchdog.turn_timeout_secs = secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.candidates().is_empty() {
            return Err(ConfigError::Validation(
                "endpoints must yield at least one candidate origin".to_owned(),
            ));
        }
        if self.watchdog.turn_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "watchdog.turn_timeout_secs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

fn read_file_config(options: &LoadOptions) -> Result<Option<FileConfig>, ConfigError> {
    let (path, explicit) = match &options.config_path {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !path.exists() {
        if options.require_file || explicit {
            return Err(ConfigError::MissingConfigFile(path));
        }
        return Ok(None);
    }

    let raw = fs::read_to_string(&path)
        .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
    let parsed =
        toml::from_str(&raw).map_err(|source| ConfigError::ParseFile { path, source })?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_cover_the_dev_topology() {
        let config = AppConfig::default();
        assert_eq!(
            config.endpoints.candidates(),
            vec!["http://localhost:3000".to_owned(), "http://localhost:3001".to_owned()]
        );
        assert_eq!(config.watchdog.turn_timeout_secs, 45);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn explicit_api_base_leads_the_candidate_order() {
        let mut config = AppConfig::default();
        config.endpoints.api_base = Some("https://api.example.com/".to_owned());

        let candidates = config.endpoints.candidates();
        assert_eq!(candidates[0], "https://api.example.com");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn duplicate_origins_are_collapsed() {
        let mut config = AppConfig::default();
        config.endpoints.api_base = Some("http://localhost:3001".to_owned());

        let candidates = config.endpoints.candidates();
        assert_eq!(
            candidates,
            vec!["http://localhost:3001".to_owned(), "http://localhost:3000".to_owned()]
        );
    }

    #[test]
    fn config_file_and_overrides_are_applied_in_order() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[endpoints]\napi_base = \"http://file.example\"\n\n[watchdog]\nturn_timeout_secs = 10\n\n[logging]\nformat = \"json\"\n"
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            overrides: ConfigOverrides {
                turn_timeout_secs: Some(20),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        assert_eq!(config.endpoints.api_base.as_deref(), Some("http://file.example"));
        assert_eq!(config.logging.format, LogFormat::Json);
        // programmatic overrides win over the file
        assert_eq!(config.watchdog.turn_timeout_secs, 20);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            ..LoadOptions::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_watchdog_bound_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                turn_timeout_secs: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(super::ConfigError::Validation(_))));
    }
}
