use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use orderdesk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(effective_fields(&config).into_iter().map(|field| {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        render_line(field.key, &field.value, source)
    }));
    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let field = |key, env_key, value: String| ConfigField { key, env_key, value };
    vec![
        field("database.url", "ORDERDESK_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "ORDERDESK_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "ORDERDESK_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field(
            "whatsapp.access_token",
            "ORDERDESK_WHATSAPP_ACCESS_TOKEN",
            redact_secret(Some(&config.whatsapp.access_token)),
        ),
        field(
            "whatsapp.phone_number_id",
            "ORDERDESK_WHATSAPP_PHONE_NUMBER_ID",
            config.whatsapp.phone_number_id.clone(),
        ),
        field(
            "whatsapp.verify_token",
            "ORDERDESK_WHATSAPP_VERIFY_TOKEN",
            redact_secret(Some(&config.whatsapp.verify_token)),
        ),
        field(
            "whatsapp.app_secret",
            "ORDERDESK_WHATSAPP_APP_SECRET",
            redact_secret(config.whatsapp.app_secret.as_ref()),
        ),
        field(
            "whatsapp.api_base_url",
            "ORDERDESK_WHATSAPP_API_BASE_URL",
            config.whatsapp.api_base_url.clone(),
        ),
        field("llm.provider", "ORDERDESK_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        field("llm.model", "ORDERDESK_LLM_MODEL", config.llm.model.clone()),
        field(
            "llm.base_url",
            "ORDERDESK_LLM_BASE_URL",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("llm.api_key", "ORDERDESK_LLM_API_KEY", redact_secret(config.llm.api_key.as_ref())),
        field(
            "agent.tool_timeout_secs",
            "ORDERDESK_AGENT_TOOL_TIMEOUT_SECS",
            config.agent.tool_timeout_secs.to_string(),
        ),
        field(
            "agent.progress_notices",
            "ORDERDESK_AGENT_PROGRESS_NOTICES",
            config.agent.progress_notices.to_string(),
        ),
        field("matcher.threshold", "ORDERDESK_MATCHER_THRESHOLD", config.matcher.threshold.to_string()),
        field(
            "server.bind_address",
            "ORDERDESK_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        field("server.port", "ORDERDESK_SERVER_PORT", config.server.port.to_string()),
        field("logging.level", "ORDERDESK_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "ORDERDESK_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("orderdesk.toml"), PathBuf::from("config/orderdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

/// Shows at most the last four characters of a secret.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
