use std::sync::Arc;
use std::time::Duration;

use hitter_core::config::{AppConfig, ConfigError, LoadOptions};
use hitter_core::translate::{LanguagePair, TranslateError, Translator, UnconfiguredTranslator};
use hitter_core::{
    MutexCoordinator, ObjectStaging, ObjectStore, RandomIdGenerator, ShortUrlService, UrlSigner,
};
use hitter_db::{connect_with_settings, migrations, DbPool, SqlExpiringStore, SqlObjectStore};
use hitter_slack::handlers::{HelpHandler, HitHandler, LinkHandler, ShortHandler, TranslateHandler};
use hitter_slack::{
    CommandRegistry, HttpSlackClient, ProcessorSettings, RequestVerifier, SlackApi, SlackApiError,
    WebhookProcessor,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::reaper::Reaper;
use crate::routes::AppState;
use crate::translate::HttpTranslator;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub reaper: Reaper,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client setup failed: {0}")]
    Slack(#[source] SlackApiError),
    #[error("translation client setup failed: {0}")]
    Translate(#[source] TranslateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let slack: Arc<dyn SlackApi> = Arc::new(
        HttpSlackClient::new(
            config.slack.oauth_token.clone(),
            config.slack.api_base_url.clone(),
            Duration::from_secs(config.slack.timeout_secs),
        )
        .map_err(BootstrapError::Slack)?,
    );
    let translator = build_translator(&config)?;

    let mutex_store =
        Arc::new(SqlExpiringStore::new(db_pool.clone(), &config.storage.mutex_table));
    let url_store = Arc::new(SqlExpiringStore::new(db_pool.clone(), &config.storage.url_table));
    let object_store: Arc<dyn ObjectStore> = Arc::new(SqlObjectStore::new(db_pool.clone()));

    let short_urls = Arc::new(
        ShortUrlService::new(url_store.clone(), config.api.base_url.clone())
            .with_generator(Arc::new(RandomIdGenerator::new(config.short_url.id_length)))
            .with_max_attempts(config.short_url.max_attempts)
            .with_max_ttl(DAY * config.short_url.max_ttl_days),
    );
    let staging = Arc::new(
        ObjectStaging::new(
            object_store.clone(),
            staging_signer(&config),
            config.storage.bucket.clone(),
            config.staging_public_base_url().to_string(),
        )
        .with_max_object_bytes(config.staging.max_object_bytes),
    );

    let registry =
        Arc::new(build_registry(&config, slack.clone(), translator, &short_urls, &staging));
    info!(
        event_name = "system.bootstrap.commands_registered",
        correlation_id = "bootstrap",
        commands = ?registry.names(),
        "command handlers registered"
    );

    let processor = WebhookProcessor::new(
        RequestVerifier::new(
            config.slack.verification_token.clone(),
            config.slack.signing_secret.clone(),
        ),
        MutexCoordinator::new(mutex_store.clone(), config.mutex.hold()),
        registry,
        slack,
        ProcessorSettings::from_config(&config),
    );

    let reaper = Reaper::new(Duration::from_secs(config.reaper.interval_secs))
        .with_namespace(mutex_store)
        .with_namespace(url_store)
        .with_objects(object_store);

    Ok(Application {
        state: AppState { processor: Arc::new(processor), short_urls, staging },
        reaper,
        db_pool,
        config,
    })
}

fn build_translator(config: &AppConfig) -> Result<Arc<dyn Translator>, BootstrapError> {
    match HttpTranslator::from_config(&config.translate).map_err(BootstrapError::Translate)? {
        Some(translator) => Ok(Arc::new(translator)),
        None => {
            info!(
                event_name = "system.bootstrap.translate_disabled",
                correlation_id = "bootstrap",
                "no translation backend configured"
            );
            Ok(Arc::new(UnconfiguredTranslator))
        }
    }
}

fn staging_signer(config: &AppConfig) -> UrlSigner {
    match &config.staging.signing_secret {
        Some(secret) => UrlSigner::new(secret.clone()),
        None => {
            warn!(
                event_name = "system.bootstrap.ephemeral_staging_secret",
                correlation_id = "bootstrap",
                "no staging signing secret configured; signed links will not survive a restart"
            );
            UrlSigner::ephemeral()
        }
    }
}

/// `help` goes last so its reference covers every other command.
fn build_registry(
    config: &AppConfig,
    slack: Arc<dyn SlackApi>,
    translator: Arc<dyn Translator>,
    short_urls: &Arc<ShortUrlService>,
    staging: &Arc<ObjectStaging>,
) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(HitHandler::new(slack.clone())));
    registry.register(Arc::new(TranslateHandler::new(
        translator,
        LanguagePair::new(
            config.translate.primary_language.clone(),
            config.translate.secondary_language.clone(),
        ),
    )));
    registry.register(Arc::new(LinkHandler::new(
        slack,
        staging.clone(),
        config.staging.default_link_lifetime(),
        config.staging.max_object_bytes,
    )));
    registry.register(Arc::new(ShortHandler::new(
        short_urls.clone(),
        config.short_url.default_ttl_days,
    )));
    let help = HelpHandler::from_registry(&registry);
    registry.register(Arc::new(help));
    registry
}
