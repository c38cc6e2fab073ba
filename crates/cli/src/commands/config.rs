use std::env;
use std::fs;
use std::path::Path;

use leadflow_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, env_key, value: String| Field { key, env_key, value };
    let optional = |value: Option<String>| value.unwrap_or_else(|| "<unset>".to_string());

    vec![
        field("database.url", "LEADFLOW_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "LEADFLOW_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "LEADFLOW_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("llm.provider", "LEADFLOW_LLM_PROVIDER", config.llm.provider.as_str().to_string()),
        field("llm.model", "LEADFLOW_LLM_MODEL", config.llm.model.clone()),
        field("llm.base_url", "LEADFLOW_LLM_BASE_URL", optional(config.llm.base_url.clone())),
        field(
            "llm.api_key",
            "LEADFLOW_LLM_API_KEY",
            config
                .llm
                .api_key
                .as_ref()
                .map(|key| redact_secret(key.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("llm.timeout_secs", "LEADFLOW_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        field("llm.max_retries", "LEADFLOW_LLM_MAX_RETRIES", config.llm.max_retries.to_string()),
        field(
            "server.bind_address",
            "LEADFLOW_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        field("server.port", "LEADFLOW_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            "LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "engine.turn_window",
            "LEADFLOW_ENGINE_TURN_WINDOW",
            config.engine.turn_window.to_string(),
        ),
        field(
            "engine.inactivity_days",
            "LEADFLOW_ENGINE_INACTIVITY_DAYS",
            config.engine.inactivity_days.to_string(),
        ),
        field(
            "engine.profile_path",
            "LEADFLOW_ENGINE_PROFILE_PATH",
            optional(config.engine.profile_path.as_ref().map(|path| path.display().to_string())),
        ),
        field(
            "engine.completion_timeout_secs",
            "LEADFLOW_ENGINE_COMPLETION_TIMEOUT_SECS",
            config.engine.completion_timeout_secs.to_string(),
        ),
        field("logging.level", "LEADFLOW_LOGGING_LEVEL", config.logging.level.clone()),
        field(
            "logging.format",
            "LEADFLOW_LOGGING_FORMAT",
            config.logging.format.as_str().to_string(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

/// Keeps a short provider prefix such as `sk-` so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
