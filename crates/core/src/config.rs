use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub mutex: MutexConfig,
    pub short_url: ShortUrlConfig,
    pub staging: StagingConfig,
    pub translate: TranslateConfig,
    pub processing: ProcessingConfig,
    pub server: ServerConfig,
    pub reaper: ReaperConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub oauth_token: SecretString,
    pub verification_token: SecretString,
    pub signing_secret: Option<SecretString>,
    pub channel_id: Option<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

/// Logical table names. Each one becomes a namespace in the expiring store.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub mutex_table: String,
    pub url_table: String,
    pub bucket: String,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct MutexConfig {
    pub hold_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ShortUrlConfig {
    pub id_length: usize,
    pub max_attempts: u32,
    pub default_ttl_days: u32,
    pub max_ttl_days: u32,
}

#[derive(Clone, Debug)]
pub struct StagingConfig {
    pub signing_secret: Option<SecretString>,
    pub public_base_url: Option<String>,
    pub default_link_minutes: u32,
    pub max_object_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct TranslateConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub primary_language: String,
    pub secondary_language: String,
}

#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub handler_timeout_secs: u64,
    pub display_utc_offset_minutes: i32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub api_base_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub slack_oauth_token: Option<String>,
    pub slack_verification_token: Option<String>,
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
                url: "sqlite://hitter.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                oauth_token: String::new().into(),
                verification_token: String::new().into(),
                signing_secret: None,
                channel_id: None,
                api_base_url: "https://slack.com/api".to_string(),
                timeout_secs: 10,
            },
            storage: StorageConfig {
                mutex_table: "hitter-mutex".to_string(),
                url_table: "hitter-url".to_string(),
                bucket: "hitter-objects".to_string(),
            },
            api: ApiConfig { base_url: "http://127.0.0.1:8080".to_string() },
            mutex: MutexConfig { hold_secs: 24 * 60 * 60 },
            short_url: ShortUrlConfig {
                id_length: 8,
                max_attempts: 5,
                default_ttl_days: 1,
                max_ttl_days: 30,
            },
            staging: StagingConfig {
                signing_secret: None,
                public_base_url: None,
                default_link_minutes: 15,
                max_object_bytes: 50 * 1024 * 1024,
            },
            translate: TranslateConfig {
                base_url: None,
                api_key: None,
                timeout_secs: 15,
                primary_language: "ja".to_string(),
                secondary_language: "en".to_string(),
            },
            processing: ProcessingConfig {
                handler_timeout_secs: 25,
                display_utc_offset_minutes: 9 * 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            reaper: ReaperConfig { enabled: true, interval_secs: 300 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl MutexConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }
}

impl StagingConfig {
    pub fn default_link_lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.default_link_minutes) * 60)
    }
}

impl ProcessingConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hitter.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Base URL used for signed object links. Falls back to the public API base URL.
    pub fn staging_public_base_url(&self) -> &str {
        self.staging.public_base_url.as_deref().unwrap_or(&self.api.base_url)
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

        if let Some(slack) = patch.slack {
            if let Some(oauth_token) = slack.oauth_token {
                self.slack.oauth_token = secret_value(oauth_token);
            }
            if let Some(verification_token) = slack.verification_token {
                self.slack.verification_token = secret_value(verification_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(channel_id) = slack.channel_id {
                self.slack.channel_id = Some(channel_id);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(mutex_table) = storage.mutex_table {
                self.storage.mutex_table = mutex_table;
            }
            if let Some(url_table) = storage.url_table {
                self.storage.url_table = url_table;
            }
            if let Some(bucket) = storage.bucket {
                self.storage.bucket = bucket;
            }
        }

        if let Some(api) = patch.api {
            if let Some(base_url) = api.base_url {
                self.api.base_url = base_url;
            }
        }

        if let Some(mutex) = patch.mutex {
            if let Some(hold_secs) = mutex.hold_secs {
                self.mutex.hold_secs = hold_secs;
            }
        }

        if let Some(short_url) = patch.short_url {
            if let Some(id_length) = short_url.id_length {
                self.short_url.id_length = id_length;
            }
            if let Some(max_attempts) = short_url.max_attempts {
                self.short_url.max_attempts = max_attempts;
            }
            if let Some(default_ttl_days) = short_url.default_ttl_days {
                self.short_url.default_ttl_days = default_ttl_days;
            }
            if let Some(max_ttl_days) = short_url.max_ttl_days {
                self.short_url.max_ttl_days = max_ttl_days;
            }
        }

        if let Some(staging) = patch.staging {
            if let Some(signing_secret) = staging.signing_secret {
                self.staging.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(public_base_url) = staging.public_base_url {
                self.staging.public_base_url = Some(public_base_url);
            }
            if let Some(default_link_minutes) = staging.default_link_minutes {
                self.staging.default_link_minutes = default_link_minutes;
            }
            if let Some(max_object_bytes) = staging.max_object_bytes {
                self.staging.max_object_bytes = max_object_bytes;
            }
        }

        if let Some(translate) = patch.translate {
            if let Some(base_url) = translate.base_url {
                self.translate.base_url = Some(base_url);
            }
            if let Some(api_key) = translate.api_key {
                self.translate.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = translate.timeout_secs {
                self.translate.timeout_secs = timeout_secs;
            }
            if let Some(primary_language) = translate.primary_language {
                self.translate.primary_language = primary_language;
            }
            if let Some(secondary_language) = translate.secondary_language {
                self.translate.secondary_language = secondary_language;
            }
        }

        if let Some(processing) = patch.processing {
            if let Some(handler_timeout_secs) = processing.handler_timeout_secs {
                self.processing.handler_timeout_secs = handler_timeout_secs;
            }
            if let Some(offset) = processing.display_utc_offset_minutes {
                self.processing.display_utc_offset_minutes = offset;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(reaper) = patch.reaper {
            if let Some(enabled) = reaper.enabled {
                self.reaper.enabled = enabled;
            }
            if let Some(interval_secs) = reaper.interval_secs {
                self.reaper.interval_secs = interval_secs;
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
        if let Some(value) = read_env("HITTER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HITTER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("HITTER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HITTER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HITTER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLACK_OAUTH_ACCESS_TOKEN") {
            self.slack.oauth_token = secret_value(value);
        }
        if let Some(value) = read_env("SLACK_VERIFICATION_TOKEN") {
            self.slack.verification_token = secret_value(value);
        }
        if let Some(value) = read_env("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("SLACK_CHANNEL_ID") {
            self.slack.channel_id = Some(value);
        }
        if let Some(value) = read_env("HITTER_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("HITTER_SLACK_TIMEOUT_SECS") {
            self.slack.timeout_secs = parse_u64("HITTER_SLACK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MUTEX_TABLE_NAME") {
            self.storage.mutex_table = value;
        }
        if let Some(value) = read_env("URL_TABLE_NAME") {
            self.storage.url_table = value;
        }
        if let Some(value) = read_env("S3_BUCKET_NAME") {
            self.storage.bucket = value;
        }
        if let Some(value) = read_env("API_BASE_URL") {
            self.api.base_url = value;
        }

        if let Some(value) = read_env("HITTER_MUTEX_HOLD_SECS") {
            self.mutex.hold_secs = parse_u64("HITTER_MUTEX_HOLD_SECS", &value)?;
        }

        if let Some(value) = read_env("HITTER_SHORT_URL_ID_LENGTH") {
            self.short_url.id_length = parse_usize("HITTER_SHORT_URL_ID_LENGTH", &value)?;
        }
        if let Some(value) = read_env("HITTER_SHORT_URL_MAX_ATTEMPTS") {
            self.short_url.max_attempts = parse_u32("HITTER_SHORT_URL_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("HITTER_SHORT_URL_DEFAULT_TTL_DAYS") {
            self.short_url.default_ttl_days =
                parse_u32("HITTER_SHORT_URL_DEFAULT_TTL_DAYS", &value)?;
        }
        if let Some(value) = read_env("HITTER_SHORT_URL_MAX_TTL_DAYS") {
            self.short_url.max_ttl_days = parse_u32("HITTER_SHORT_URL_MAX_TTL_DAYS", &value)?;
        }

        if let Some(value) = read_env("HITTER_STAGING_SIGNING_SECRET") {
            self.staging.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("HITTER_STAGING_PUBLIC_BASE_URL") {
            self.staging.public_base_url = Some(value);
        }
        if let Some(value) = read_env("HITTER_STAGING_DEFAULT_LINK_MINUTES") {
            self.staging.default_link_minutes =
                parse_u32("HITTER_STAGING_DEFAULT_LINK_MINUTES", &value)?;
        }
        if let Some(value) = read_env("HITTER_STAGING_MAX_OBJECT_BYTES") {
            self.staging.max_object_bytes = parse_u64("HITTER_STAGING_MAX_OBJECT_BYTES", &value)?;
        }

        if let Some(value) = read_env("HITTER_TRANSLATE_BASE_URL") {
            self.translate.base_url = Some(value);
        }
        if let Some(value) = read_env("HITTER_TRANSLATE_API_KEY") {
            self.translate.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HITTER_TRANSLATE_TIMEOUT_SECS") {
            self.translate.timeout_secs = parse_u64("HITTER_TRANSLATE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HITTER_PROCESSING_HANDLER_TIMEOUT_SECS") {
            self.processing.handler_timeout_secs =
                parse_u64("HITTER_PROCESSING_HANDLER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HITTER_PROCESSING_DISPLAY_UTC_OFFSET_MINUTES") {
            self.processing.display_utc_offset_minutes =
                parse_i32("HITTER_PROCESSING_DISPLAY_UTC_OFFSET_MINUTES", &value)?;
        }

        if let Some(value) = read_env("HITTER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HITTER_SERVER_PORT") {
            self.server.port = parse_u16("HITTER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HITTER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HITTER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HITTER_REAPER_ENABLED") {
            self.reaper.enabled = parse_bool("HITTER_REAPER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HITTER_REAPER_INTERVAL_SECS") {
            self.reaper.interval_secs = parse_u64("HITTER_REAPER_INTERVAL_SECS", &value)?;
        }

        let log_level = read_env("HITTER_LOGGING_LEVEL").or_else(|| read_env("HITTER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HITTER_LOGGING_FORMAT").or_else(|| read_env("HITTER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }
        if let Some(value) = read_env("DEBUG_LOG") {
            if parse_bool("DEBUG_LOG", &value)? {
                self.logging.level = "debug".to_string();
            }
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
        if let Some(api_base_url) = overrides.api_base_url {
            self.api.base_url = api_base_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(oauth_token) = overrides.slack_oauth_token {
            self.slack.oauth_token = secret_value(oauth_token);
        }
        if let Some(verification_token) = overrides.slack_verification_token {
            self.slack.verification_token = secret_value(verification_token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_storage(&self.storage)?;
        validate_http_url("api.base_url", &self.api.base_url)?;
        validate_mutex(&self.mutex)?;
        validate_short_url(&self.short_url)?;
        validate_staging(&self.staging)?;
        validate_translate(&self.translate)?;
        validate_processing(&self.processing)?;
        validate_server(&self.server)?;
        validate_reaper(&self.reaper)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hitter.toml"), PathBuf::from("config/hitter.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let verification_token = slack.verification_token.expose_secret();
    if verification_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.verification_token is required (SLACK_VERIFICATION_TOKEN). Get it from https://api.slack.com/apps > Your App > Basic Information > App Credentials".to_string()
        ));
    }

    let oauth_token = slack.oauth_token.expose_secret();
    if oauth_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.oauth_token is required (SLACK_OAUTH_ACCESS_TOKEN). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !oauth_token.starts_with("xoxb-") {
        let hint = if oauth_token.starts_with("xapp-") {
            " (hint: you may have used an app-level token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.oauth_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if let Some(secret) = &slack.signing_secret {
        if secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "slack.signing_secret must not be blank when set".to_string(),
            ));
        }
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)?;

    if slack.timeout_secs == 0 || slack.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("storage.mutex_table", &storage.mutex_table),
        ("storage.url_table", &storage.url_table),
        ("storage.bucket", &storage.bucket),
    ] {
        let valid = (3..=255).contains(&value.len())
            && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !valid {
            return Err(ConfigError::Validation(format!(
                "{key} must be 3..=255 characters of [A-Za-z0-9_.-], got `{value}`"
            )));
        }
    }

    if storage.mutex_table == storage.url_table {
        return Err(ConfigError::Validation(
            "storage.mutex_table and storage.url_table must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_mutex(mutex: &MutexConfig) -> Result<(), ConfigError> {
    if mutex.hold_secs == 0 {
        return Err(ConfigError::Validation(
            "mutex.hold_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_short_url(short_url: &ShortUrlConfig) -> Result<(), ConfigError> {
    if !(4..=32).contains(&short_url.id_length) {
        return Err(ConfigError::Validation(
            "short_url.id_length must be in range 4..=32".to_string(),
        ));
    }
    if short_url.max_attempts == 0 || short_url.max_attempts > 20 {
        return Err(ConfigError::Validation(
            "short_url.max_attempts must be in range 1..=20".to_string(),
        ));
    }
    if short_url.default_ttl_days == 0 || short_url.default_ttl_days > short_url.max_ttl_days {
        return Err(ConfigError::Validation(
            "short_url.default_ttl_days must be in range 1..=short_url.max_ttl_days".to_string(),
        ));
    }
    Ok(())
}

fn validate_staging(staging: &StagingConfig) -> Result<(), ConfigError> {
    if staging.default_link_minutes == 0 || staging.default_link_minutes > 2880 {
        return Err(ConfigError::Validation(
            "staging.default_link_minutes must be in range 1..=2880".to_string(),
        ));
    }
    if staging.max_object_bytes == 0 {
        return Err(ConfigError::Validation(
            "staging.max_object_bytes must be greater than zero".to_string(),
        ));
    }
    if let Some(secret) = &staging.signing_secret {
        if secret.expose_secret().len() < 16 {
            return Err(ConfigError::Validation(
                "staging.signing_secret must be at least 16 characters".to_string(),
            ));
        }
    }
    if let Some(base_url) = &staging.public_base_url {
        validate_http_url("staging.public_base_url", base_url)?;
    }
    Ok(())
}

fn validate_translate(translate: &TranslateConfig) -> Result<(), ConfigError> {
    if translate.timeout_secs == 0 || translate.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "translate.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if translate.primary_language.trim().is_empty()
        || translate.secondary_language.trim().is_empty()
    {
        return Err(ConfigError::Validation(
            "translate.primary_language and translate.secondary_language are required".to_string(),
        ));
    }
    if translate.primary_language == translate.secondary_language {
        return Err(ConfigError::Validation(
            "translate.primary_language and translate.secondary_language must differ".to_string(),
        ));
    }
    if let Some(base_url) = &translate.base_url {
        validate_http_url("translate.base_url", base_url)?;
    }
    Ok(())
}

fn validate_processing(processing: &ProcessingConfig) -> Result<(), ConfigError> {
    if processing.handler_timeout_secs == 0 || processing.handler_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "processing.handler_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if processing.display_utc_offset_minutes.abs() > 14 * 60 {
        return Err(ConfigError::Validation(
            "processing.display_utc_offset_minutes must be within +/-840".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_reaper(reaper: &ReaperConfig) -> Result<(), ConfigError> {
    if reaper.enabled && reaper.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "reaper.interval_secs must be greater than zero when the reaper is enabled"
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "{key} must be an absolute http:// or https:// URL, got `{value}`"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid_override(key, value)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    storage: Option<StoragePatch>,
    api: Option<ApiPatch>,
    mutex: Option<MutexPatch>,
    short_url: Option<ShortUrlPatch>,
    staging: Option<StagingPatch>,
    translate: Option<TranslatePatch>,
    processing: Option<ProcessingPatch>,
    server: Option<ServerPatch>,
    reaper: Option<ReaperPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    oauth_token: Option<String>,
    verification_token: Option<String>,
    signing_secret: Option<String>,
    channel_id: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    mutex_table: Option<String>,
    url_table: Option<String>,
    bucket: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPatch {
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MutexPatch {
    hold_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ShortUrlPatch {
    id_length: Option<usize>,
    max_attempts: Option<u32>,
    default_ttl_days: Option<u32>,
    max_ttl_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StagingPatch {
    signing_secret: Option<String>,
    public_base_url: Option<String>,
    default_link_minutes: Option<u32>,
    max_object_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslatePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    primary_language: Option<String>,
    secondary_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessingPatch {
    handler_timeout_secs: Option<u64>,
    display_utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReaperPatch {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
