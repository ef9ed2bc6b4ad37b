use std::sync::Arc;

use itemdesk_agent::item_tools::register_item_tools;
use itemdesk_agent::{OpenAiClient, SessionController, ToolRegistry};
use itemdesk_core::config::{AppConfig, ConfigError};
use itemdesk_core::errors::{ApplicationError, ConversationError};
use itemdesk_db::repositories::SqlItemRepository;
use itemdesk_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub controller: Arc<SessionController>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("tool registration failed: {0}")]
    Tools(#[source] ConversationError),
    #[error("agent client setup failed: {0}")]
    Llm(#[source] ApplicationError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let mut tools = ToolRegistry::new();
    register_item_tools(&mut tools, Arc::new(SqlItemRepository::new(db_pool.clone())))
        .map_err(BootstrapError::Tools)?;
    let llm = OpenAiClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        endpoint = llm.endpoint(),
        model = %config.llm.model,
        tools = tools.len(),
        "agent client configured"
    );

    let controller =
        Arc::new(SessionController::new(Arc::new(llm), Arc::new(tools), config.session.clone()));

    Ok(Application { config, db_pool, controller })
}
