//! Application Startup
//!
//! Application building and server initialization.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::services::{
    DeletionService, MessageService, ReactionService, StatusService,
};
use crate::config::Settings;
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    PgChatRepository, PgMessageRepository, PgUserRepository,
};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{Gateway, MessageDispatcher, PresenceTracker, TypingTracker};
use crate::shared::locks::MessageLocks;
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub gateway: Arc<Gateway>,
    pub typing: Arc<TypingTracker>,
    pub presence: Arc<PresenceTracker<PgUserRepository>>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub messages: Arc<MessageService<PgMessageRepository, PgChatRepository>>,
    pub reactions: Arc<ReactionService<PgMessageRepository, PgChatRepository>>,
    pub deletions: Arc<DeletionService<PgMessageRepository>>,
    pub statuses: Arc<StatusService<PgMessageRepository, PgChatRepository>>,
    pub chats: Arc<PgChatRepository>,
    pub users: Arc<PgUserRepository>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        crate::presentation::http::handlers::health::init_server_start();

        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        let snowflake = Arc::new(SnowflakeGenerator::new(settings.snowflake.machine_id as u64));

        let message_repo = Arc::new(PgMessageRepository::new(db.clone()));
        let chat_repo = Arc::new(PgChatRepository::new(db.clone()));
        let user_repo = Arc::new(PgUserRepository::new(db.clone()));

        let gateway = Arc::new(Gateway::new());
        let typing = Arc::new(TypingTracker::new(Duration::from_secs(
            settings.typing.ttl_secs,
        )));
        let presence = Arc::new(PresenceTracker::new(gateway.clone(), user_repo.clone()));
        let dispatcher = Arc::new(MessageDispatcher::new(gateway.clone()));
        let locks = Arc::new(MessageLocks::new());

        let state = AppState {
            db,
            snowflake: snowflake.clone(),
            gateway: gateway.clone(),
            typing,
            presence,
            dispatcher,
            messages: Arc::new(MessageService::new(
                message_repo.clone(),
                chat_repo.clone(),
                snowflake,
            )),
            reactions: Arc::new(ReactionService::new(
                message_repo.clone(),
                chat_repo.clone(),
                locks,
            )),
            deletions: Arc::new(DeletionService::new(message_repo.clone())),
            statuses: Arc::new(StatusService::new(message_repo, chat_repo.clone())),
            chats: chat_repo,
            users: user_repo,
            settings: Arc::new(settings.clone()),
        };

        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        let listener = TcpListener::bind(settings.server_addr()).await?;
        tracing::info!("Listening on {}", settings.server_addr());

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}
