use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use thiserror::Error;
use tracing::info;

use orderdesk_agent::tools::RegistryError;
use orderdesk_agent::{
    order_tool_registry, AgentRuntime, AgentSettings, LlmClient, LlmError, OpenAiCompatibleClient,
};
use orderdesk_core::channel::{ChannelError, InboundEvent, OutboundChannel};
use orderdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use orderdesk_core::matcher::ProductMatcher;
use orderdesk_db::{
    connect_from_config, migrations, CatalogRepository, ConversationRepository, DbPool,
    OrderRepository, SqlCatalogRepository, SqlConversationRepository, SqlOrderRepository,
};
use orderdesk_whatsapp::{
    EventContext, EventDispatcher, EventHandlerError, TextMessageHandler, TextMessageService,
    WhatsAppClient,
};

use crate::{api, health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub runtime: Arc<AgentRuntime>,
    pub dispatcher: Arc<EventDispatcher>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("whatsapp client setup failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("tool registry setup failed: {0}")]
    Tools(#[from] RegistryError),
    #[error("product matcher setup failed: {0}")]
    Matcher(String),
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
    config.validate()?;

    let db_pool = connect_from_config(&config.database)
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

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    let outbound: Arc<dyn OutboundChannel> =
        Arc::new(WhatsAppClient::from_config(&config.whatsapp)?);

    assemble(config, db_pool, llm, outbound)
}

/// Wires repositories, tools, the agent runtime and the webhook dispatcher
/// onto an already migrated pool.
pub fn assemble(
    config: AppConfig,
    db_pool: DbPool,
    llm: Arc<dyn LlmClient>,
    outbound: Arc<dyn OutboundChannel>,
) -> Result<Application, BootstrapError> {
    let catalog: Arc<dyn CatalogRepository> = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let orders: Arc<dyn OrderRepository> = Arc::new(
        SqlOrderRepository::new(db_pool.clone())
            .with_retry_attempts(config.agent.order_retry_attempts),
    );
    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(SqlConversationRepository::new(db_pool.clone()));

    let matcher = ProductMatcher::new(config.matcher.clone())
        .map_err(|error| BootstrapError::Matcher(error.to_string()))?;
    let tools = order_tool_registry(Arc::clone(&catalog), Arc::clone(&orders), Arc::new(matcher))?;
    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tools = ?tools.names(),
        "agent tools registered"
    );

    let runtime = Arc::new(AgentRuntime::new(
        llm,
        Arc::new(tools),
        conversations,
        outbound,
        AgentSettings::from_config(&config),
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(TextMessageHandler::new(AgentTurnService::new(Arc::clone(&runtime))));

    Ok(Application {
        config,
        db_pool,
        catalog,
        orders,
        runtime,
        dispatcher: Arc::new(dispatcher),
    })
}

pub fn app_router(app: &Application) -> Router {
    let webhook_state = webhook::WebhookState {
        dispatcher: Arc::clone(&app.dispatcher),
        verify_token: app.config.whatsapp.verify_token.clone(),
        app_secret: app.config.whatsapp.app_secret.clone(),
    };
    let api_state =
        api::ApiState { catalog: Arc::clone(&app.catalog), orders: Arc::clone(&app.orders) };

    let health_state =
        health::HealthState { db_pool: app.db_pool.clone(), catalog: Arc::clone(&app.catalog) };

    health::router(health_state)
        .merge(webhook::router(webhook_state))
        .merge(api::router(api_state))
}

/// Runs one agent turn per inbound text. Turn failures are answered with the
/// apology message inside the runtime, so they never surface as handler errors.
pub struct AgentTurnService {
    runtime: Arc<AgentRuntime>,
}

impl AgentTurnService {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl TextMessageService for AgentTurnService {
    async fn handle_text(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        if let Some(outcome) = self.runtime.handle_inbound(event).await {
            info!(
                event_name = "ingress.whatsapp.turn_finished",
                correlation_id = %ctx.correlation_id,
                turn_id = %outcome.correlation_id,
                state = outcome.state.as_str(),
                "inbound message handled"
            );
        }
        Ok(())
    }
}
