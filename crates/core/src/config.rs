use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub execution: ExecutionConfig,
    pub bus: BusConfig,
    pub sanitizer: SanitizerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub base_url: String,
    pub auth_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub flush_interval_secs: u64,
    pub flush_threshold: usize,
    pub listener_queue_depth: usize,
}

#[derive(Clone, Debug)]
pub struct SanitizerConfig {
    pub critical_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub execution_base_url: Option<String>,
    pub execution_auth_token: Option<String>,
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
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://voxflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            execution: ExecutionConfig {
                base_url: "http://localhost:7040".to_string(),
                auth_token: None,
                timeout_secs: 30,
                breaker_failure_threshold: 5,
                breaker_cooldown_secs: 30,
            },
            bus: BusConfig {
                flush_interval_secs: 5,
                flush_threshold: 100,
                listener_queue_depth: 256,
            },
            sanitizer: SanitizerConfig { critical_fields: Vec::new() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

/// Partial document shape of `voxflow.toml`; every field is optional and
/// patches the defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    execution: Option<ExecutionPatch>,
    bus: Option<BusPatch>,
    sanitizer: Option<SanitizerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionPatch {
    base_url: Option<String>,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
    breaker_failure_threshold: Option<u32>,
    breaker_cooldown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusPatch {
    flush_interval_secs: Option<u64>,
    flush_threshold: Option<usize>,
    listener_queue_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SanitizerPatch {
    critical_fields: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<String>,
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let requested = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(requested));
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }
        if let Some(execution) = patch.execution {
            if let Some(base_url) = execution.base_url {
                self.execution.base_url = base_url;
            }
            if let Some(auth_token) = execution.auth_token {
                self.execution.auth_token = Some(auth_token.into());
            }
            if let Some(timeout_secs) = execution.timeout_secs {
                self.execution.timeout_secs = timeout_secs;
            }
            if let Some(threshold) = execution.breaker_failure_threshold {
                self.execution.breaker_failure_threshold = threshold;
            }
            if let Some(cooldown) = execution.breaker_cooldown_secs {
                self.execution.breaker_cooldown_secs = cooldown;
            }
        }
        if let Some(bus) = patch.bus {
            if let Some(interval) = bus.flush_interval_secs {
                self.bus.flush_interval_secs = interval;
            }
            if let Some(threshold) = bus.flush_threshold {
                self.bus.flush_threshold = threshold;
            }
            if let Some(depth) = bus.listener_queue_depth {
                self.bus.listener_queue_depth = depth;
            }
        }
        if let Some(sanitizer) = patch.sanitizer {
            if let Some(critical_fields) = sanitizer.critical_fields {
                self.sanitizer.critical_fields = critical_fields;
            }
        }
        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format.parse()?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("VOXFLOW_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(level) = env::var("VOXFLOW_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(base_url) = env::var("VOXFLOW_EXECUTION_BASE_URL") {
            if !base_url.is_empty() {
                self.execution.base_url = base_url;
            }
        }
        if let Ok(token) = env::var("VOXFLOW_EXECUTION_TOKEN") {
            if !token.is_empty() {
                self.execution.auth_token = Some(token.into());
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(base_url) = overrides.execution_base_url {
            self.execution.base_url = base_url;
        }
        if let Some(token) = overrides.execution_auth_token {
            self.execution.auth_token = Some(token.into());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.execution.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "execution.base_url must not be empty".to_string(),
            ));
        }
        if self.execution.breaker_failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "execution.breaker_failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.bus.flush_threshold == 0 {
            return Err(ConfigError::Validation(
                "bus.flush_threshold must be at least 1".to_string(),
            ));
        }
        if self.bus.listener_queue_depth == 0 {
            return Err(ConfigError::Validation(
                "bus.listener_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

const DEFAULT_CONFIG_FILE: &str = "voxflow.toml";

fn resolve_config_path(requested: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = requested {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Ok(from_env) = env::var("VOXFLOW_CONFIG") {
        let path = PathBuf::from(from_env);
        if path.exists() {
            return Some(path);
        }
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}
