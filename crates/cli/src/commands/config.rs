use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hitter_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in effective_values(&config) {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, Option<&'static str>)> {
    vec![
        ("database.url", config.database.url.clone(), Some("HITTER_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("HITTER_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("HITTER_DATABASE_TIMEOUT_SECS"),
        ),
        (
            "slack.oauth_token",
            redact_token(config.slack.oauth_token.expose_secret()),
            Some("SLACK_OAUTH_ACCESS_TOKEN"),
        ),
        (
            "slack.verification_token",
            redact_secret(Some(&config.slack.verification_token)),
            Some("SLACK_VERIFICATION_TOKEN"),
        ),
        (
            "slack.signing_secret",
            redact_secret(config.slack.signing_secret.as_ref()),
            Some("SLACK_SIGNING_SECRET"),
        ),
        (
            "slack.channel_id",
            config.slack.channel_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("SLACK_CHANNEL_ID"),
        ),
        (
            "slack.api_base_url",
            config.slack.api_base_url.clone(),
            Some("HITTER_SLACK_API_BASE_URL"),
        ),
        ("storage.mutex_table", config.storage.mutex_table.clone(), Some("MUTEX_TABLE_NAME")),
        ("storage.url_table", config.storage.url_table.clone(), Some("URL_TABLE_NAME")),
        ("storage.bucket", config.storage.bucket.clone(), Some("S3_BUCKET_NAME")),
        ("api.base_url", config.api.base_url.clone(), Some("API_BASE_URL")),
        ("mutex.hold_secs", config.mutex.hold_secs.to_string(), Some("HITTER_MUTEX_HOLD_SECS")),
        (
            "short_url.id_length",
            config.short_url.id_length.to_string(),
            Some("HITTER_SHORT_URL_ID_LENGTH"),
        ),
        (
            "short_url.default_ttl_days",
            config.short_url.default_ttl_days.to_string(),
            Some("HITTER_SHORT_URL_DEFAULT_TTL_DAYS"),
        ),
        (
            "short_url.max_ttl_days",
            config.short_url.max_ttl_days.to_string(),
            Some("HITTER_SHORT_URL_MAX_TTL_DAYS"),
        ),
        (
            "staging.signing_secret",
            redact_secret(config.staging.signing_secret.as_ref()),
            Some("HITTER_STAGING_SIGNING_SECRET"),
        ),
        (
            "staging.public_base_url",
            config.staging_public_base_url().to_string(),
            Some("HITTER_STAGING_PUBLIC_BASE_URL"),
        ),
        (
            "staging.default_link_minutes",
            config.staging.default_link_minutes.to_string(),
            Some("HITTER_STAGING_DEFAULT_LINK_MINUTES"),
        ),
        (
            "translate.base_url",
            config.translate.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("HITTER_TRANSLATE_BASE_URL"),
        ),
        (
            "translate.api_key",
            redact_secret(config.translate.api_key.as_ref()),
            Some("HITTER_TRANSLATE_API_KEY"),
        ),
        (
            "processing.handler_timeout_secs",
            config.processing.handler_timeout_secs.to_string(),
            Some("HITTER_PROCESSING_HANDLER_TIMEOUT_SECS"),
        ),
        (
            "processing.display_utc_offset_minutes",
            config.processing.display_utc_offset_minutes.to_string(),
            Some("HITTER_PROCESSING_DISPLAY_UTC_OFFSET_MINUTES"),
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            Some("HITTER_SERVER_BIND_ADDRESS"),
        ),
        ("server.port", config.server.port.to_string(), Some("HITTER_SERVER_PORT")),
        (
            "reaper.interval_secs",
            config.reaper.interval_secs.to_string(),
            Some("HITTER_REAPER_INTERVAL_SECS"),
        ),
        ("logging.level", config.logging.level.clone(), Some("HITTER_LOG_LEVEL")),
        ("logging.format", format!("{:?}", config.logging.format), Some("HITTER_LOG_FORMAT")),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("hitter.toml"), PathBuf::from("config/hitter.toml")]
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
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

/// Keeps the `xoxb-` style prefix so the token kind stays visible.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        Some(_) => "<empty>".to_string(),
        None => "<unset>".to_string(),
    }
}
