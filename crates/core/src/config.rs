use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub classifier: ClassifierConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    pub model: String,
    pub timeout_ms: u64,
    pub route_threshold: f64,
    pub confirm_threshold: f64,
    pub max_suggestions: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryConfig {
    pub decay_half_life_days: f64,
    pub pattern_retention_days: u32,
    pub shot_retention_days: u32,
}

#[derive(Clone, Debug, PartialEq)]
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub classifier_model: Option<String>,
    pub classifier_timeout_ms: Option<u64>,
    pub decay_half_life_days: Option<f64>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://caddie.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            classifier: ClassifierConfig {
                model: "caddie-intent-v1".to_string(),
                timeout_ms: 8_000,
                route_threshold: 0.75,
                confirm_threshold: 0.50,
                max_suggestions: 3,
            },
            memory: MemoryConfig {
                decay_half_life_days: 14.0,
                pattern_retention_days: 90,
                shot_retention_days: 90,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("caddie.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(classifier) = patch.classifier {
            if let Some(model) = classifier.model {
                self.classifier.model = model;
            }
            if let Some(timeout_ms) = classifier.timeout_ms {
                self.classifier.timeout_ms = timeout_ms;
            }
            if let Some(route_threshold) = classifier.route_threshold {
                self.classifier.route_threshold = route_threshold;
            }
            if let Some(confirm_threshold) = classifier.confirm_threshold {
                self.classifier.confirm_threshold = confirm_threshold;
            }
            if let Some(max_suggestions) = classifier.max_suggestions {
                self.classifier.max_suggestions = max_suggestions;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(half_life) = memory.decay_half_life_days {
                self.memory.decay_half_life_days = half_life;
            }
            if let Some(retention) = memory.pattern_retention_days {
                self.memory.pattern_retention_days = retention;
            }
            if let Some(retention) = memory.shot_retention_days {
                self.memory.shot_retention_days = retention;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CADDIE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CADDIE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_value("CADDIE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CADDIE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("CADDIE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CADDIE_CLASSIFIER_MODEL") {
            self.classifier.model = value;
        }
        if let Some(value) = read_env("CADDIE_CLASSIFIER_TIMEOUT_MS") {
            self.classifier.timeout_ms = parse_value("CADDIE_CLASSIFIER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("CADDIE_CLASSIFIER_ROUTE_THRESHOLD") {
            self.classifier.route_threshold =
                parse_value("CADDIE_CLASSIFIER_ROUTE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CADDIE_CLASSIFIER_CONFIRM_THRESHOLD") {
            self.classifier.confirm_threshold =
                parse_value("CADDIE_CLASSIFIER_CONFIRM_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CADDIE_CLASSIFIER_MAX_SUGGESTIONS") {
            self.classifier.max_suggestions =
                parse_value("CADDIE_CLASSIFIER_MAX_SUGGESTIONS", &value)?;
        }

        if let Some(value) = read_env("CADDIE_MEMORY_DECAY_HALF_LIFE_DAYS") {
            self.memory.decay_half_life_days =
                parse_value("CADDIE_MEMORY_DECAY_HALF_LIFE_DAYS", &value)?;
        }
        if let Some(value) = read_env("CADDIE_MEMORY_PATTERN_RETENTION_DAYS") {
            self.memory.pattern_retention_days =
                parse_value("CADDIE_MEMORY_PATTERN_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("CADDIE_MEMORY_SHOT_RETENTION_DAYS") {
            self.memory.shot_retention_days =
                parse_value("CADDIE_MEMORY_SHOT_RETENTION_DAYS", &value)?;
        }

        let log_level = read_env("CADDIE_LOGGING_LEVEL").or_else(|| read_env("CADDIE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CADDIE_LOGGING_FORMAT").or_else(|| read_env("CADDIE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(model) = overrides.classifier_model {
            self.classifier.model = model;
        }
        if let Some(timeout_ms) = overrides.classifier_timeout_ms {
            self.classifier.timeout_ms = timeout_ms;
        }
        if let Some(half_life) = overrides.decay_half_life_days {
            self.memory.decay_half_life_days = half_life;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_classifier(&self.classifier)?;
        validate_memory(&self.memory)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("caddie.toml"), PathBuf::from("config/caddie.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_classifier(classifier: &ClassifierConfig) -> Result<(), ConfigError> {
    if classifier.model.trim().is_empty() {
        return Err(ConfigError::Validation("classifier.model must not be empty".to_string()));
    }

    if classifier.timeout_ms == 0 || classifier.timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "classifier.timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    let ordered = 0.0 <= classifier.confirm_threshold
        && classifier.confirm_threshold < classifier.route_threshold
        && classifier.route_threshold <= 1.0;
    if !ordered {
        return Err(ConfigError::Validation(
            "classifier thresholds must satisfy 0 <= confirm_threshold < route_threshold <= 1"
                .to_string(),
        ));
    }

    if classifier.max_suggestions == 0 {
        return Err(ConfigError::Validation(
            "classifier.max_suggestions must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if !memory.decay_half_life_days.is_finite() || memory.decay_half_life_days <= 0.0 {
        return Err(ConfigError::Validation(
            "memory.decay_half_life_days must be a positive number".to_string(),
        ));
    }

    if memory.pattern_retention_days == 0 || memory.shot_retention_days == 0 {
        return Err(ConfigError::Validation(
            "memory retention windows must be greater than zero days".to_string(),
        ));
    }

    if f64::from(memory.pattern_retention_days) < memory.decay_half_life_days {
        return Err(ConfigError::Validation(
            "memory.pattern_retention_days must not be shorter than the decay half-life"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    classifier: Option<ClassifierPatch>,
    memory: Option<MemoryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    model: Option<String>,
    timeout_ms: Option<u64>,
    route_threshold: Option<f64>,
    confirm_threshold: Option<f64>,
    max_suggestions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    decay_half_life_days: Option<f64>,
    pattern_retention_days: Option<u32>,
    shot_retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
