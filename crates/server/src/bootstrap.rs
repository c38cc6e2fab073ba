use std::sync::Arc;

use leadflow_agent::{
    CompletionClient, EngineError, EngineSettings, HttpCompletionClient, OfflineCompletionClient,
    QualificationEngine, SupportAgent,
};
use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_core::profile::AgentProfile;
use leadflow_db::{connect_with_config, migrations, DbPool, SqlSnapshotStore};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<QualificationEngine>,
    pub support: Arc<SupportAgent>,
    pub completion_mode: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("engine setup failed: {0}")]
    Engine(#[from] EngineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let profile = Arc::new(AgentProfile::load_or_default(config.engine.profile_path.as_deref())?);
    info!(
        event_name = "system.bootstrap.profile_loaded",
        business = %profile.business.name,
        custom = config.engine.profile_path.is_some(),
        "agent profile loaded"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let (client, completion_mode) = completion_client(&config);
    let settings = EngineSettings::from_config(&config);

    let engine = QualificationEngine::new(
        profile.clone(),
        client.clone(),
        Arc::new(SqlSnapshotStore::new(db_pool.clone())),
        settings.clone(),
    )?;
    let support = SupportAgent::new(
        profile,
        client,
        Arc::new(SqlSnapshotStore::new(db_pool.clone())),
        settings,
    )?;

    Ok(Application {
        config,
        db_pool,
        engine: Arc::new(engine),
        support: Arc::new(support),
        completion_mode,
    })
}

/// HTTP client for the configured provider, or the offline client when it cannot be built.
fn completion_client(config: &AppConfig) -> (Arc<dyn CompletionClient>, &'static str) {
    match HttpCompletionClient::from_config(&config.llm) {
        Ok(client) => {
            info!(
                event_name = "system.bootstrap.completion_client",
                provider = config.llm.provider.as_str(),
                model = %config.llm.model,
                "completion client configured"
            );
            (Arc::new(client), "http")
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.completion_offline",
                provider = config.llm.provider.as_str(),
                error = %error,
                "completion client unavailable; every turn will use fallbacks"
            );
            (Arc::new(OfflineCompletionClient), "offline")
        }
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap, bootstrap_with_config};

    #[tokio::test]
    async fn bootstrap_migrates_and_falls_back_to_offline_completions() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;
        let app = bootstrap_with_config(config).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'conversation_snapshot'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 1);
        assert_eq!(app.completion_mode, "offline");

        let outcome = app.engine.process_turn("boot-1", "hello there").await.expect("turn");
        assert!(!outcome.reply.is_empty());
        let stored = app.engine.get_state("boot-1").await.expect("load");
        assert!(stored.is_some());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_missing_profile_file() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                profile_path: Some("/nonexistent/leadflow-profile.toml".into()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }
}
