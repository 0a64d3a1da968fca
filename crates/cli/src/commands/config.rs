use std::env;
use std::fs;
use std::path::Path;

use caddie_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// Effective configuration with the source of every field.
pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["CADDIE_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["CADDIE_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["CADDIE_DATABASE_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "classifier.model",
        &config.classifier.model,
        source("classifier.model", &["CADDIE_CLASSIFIER_MODEL"]),
    ));
    lines.push(render_line(
        "classifier.timeout_ms",
        &config.classifier.timeout_ms.to_string(),
        source("classifier.timeout_ms", &["CADDIE_CLASSIFIER_TIMEOUT_MS"]),
    ));
    lines.push(render_line(
        "classifier.route_threshold",
        &config.classifier.route_threshold.to_string(),
        source("classifier.route_threshold", &["CADDIE_CLASSIFIER_ROUTE_THRESHOLD"]),
    ));
    lines.push(render_line(
        "classifier.confirm_threshold",
        &config.classifier.confirm_threshold.to_string(),
        source("classifier.confirm_threshold", &["CADDIE_CLASSIFIER_CONFIRM_THRESHOLD"]),
    ));
    lines.push(render_line(
        "classifier.max_suggestions",
        &config.classifier.max_suggestions.to_string(),
        source("classifier.max_suggestions", &["CADDIE_CLASSIFIER_MAX_SUGGESTIONS"]),
    ));
    lines.push(render_line(
        "memory.decay_half_life_days",
        &config.memory.decay_half_life_days.to_string(),
        source("memory.decay_half_life_days", &["CADDIE_MEMORY_DECAY_HALF_LIFE_DAYS"]),
    ));
    lines.push(render_line(
        "memory.pattern_retention_days",
        &config.memory.pattern_retention_days.to_string(),
        source("memory.pattern_retention_days", &["CADDIE_MEMORY_PATTERN_RETENTION_DAYS"]),
    ));
    lines.push(render_line(
        "memory.shot_retention_days",
        &config.memory.shot_retention_days.to_string(),
        source("memory.shot_retention_days", &["CADDIE_MEMORY_SHOT_RETENTION_DAYS"]),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["CADDIE_LOGGING_LEVEL", "CADDIE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        source("logging.format", &["CADDIE_LOGGING_FORMAT", "CADDIE_LOG_FORMAT"]),
    ));
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
