use std::sync::Arc;

use agora_config::AppConfig;
use agora_database::{
    initialize_database, CategoryRepository, ChatRepository, CommunityJoinRequestRepository,
    CommunityMemberRepository, CommunityRepository, CommunityRuleRepository,
    DeletedChatRepository, MessageRepository, ParticipantRepository,
};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use agora_config::LoggingConfig;
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
    pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// The migrated pool and one handle per repository, sharing that pool.
#[derive(Clone)]
pub struct CommunityServices {
    pub db_pool: SqlitePool,
    pub categories: Arc<CategoryRepository>,
    pub communities: Arc<CommunityRepository>,
    pub members: Arc<CommunityMemberRepository>,
    pub join_requests: Arc<CommunityJoinRequestRepository>,
    pub rules: Arc<CommunityRuleRepository>,
    pub chats: Arc<ChatRepository>,
    pub participants: Arc<ParticipantRepository>,
    pub messages: Arc<MessageRepository>,
    pub deleted_chats: Arc<DeletedChatRepository>,
}

impl CommunityServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        info!(url = %config.database.url, "community services ready");
        Ok(Self::from_pool(db_pool))
    }

    pub fn from_pool(db_pool: SqlitePool) -> Self {
        Self {
            categories: Arc::new(CategoryRepository::new(db_pool.clone())),
            communities: Arc::new(CommunityRepository::new(db_pool.clone())),
            members: Arc::new(CommunityMemberRepository::new(db_pool.clone())),
            join_requests: Arc::new(CommunityJoinRequestRepository::new(db_pool.clone())),
            rules: Arc::new(CommunityRuleRepository::new(db_pool.clone())),
            chats: Arc::new(ChatRepository::new(db_pool.clone())),
            participants: Arc::new(ParticipantRepository::new(db_pool.clone())),
            messages: Arc::new(MessageRepository::new(db_pool.clone())),
            deleted_chats: Arc::new(DeletedChatRepository::new(db_pool.clone())),
            db_pool,
        }
    }

    /// Close the pool once every clone is done with it
    pub async fn shutdown(self) {
        self.db_pool.close().await;
        info!("database pool closed");
    }
}
