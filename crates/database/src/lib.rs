//! Agora Database Crate
//!
//! Community, membership and chat persistence for Agora: connection
//! management, embedded migrations, caller-managed transactions and one
//! repository per aggregate. Every repository takes a `SqlitePool` in its
//! constructor; nothing in this crate holds global state.

use agora_config::DatabaseConfig;
use sqlx::SqlitePool;
use tracing::error;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;
pub mod unit_of_work;

pub use connection::prepare_database;
pub use migrations::run_migrations;
pub use unit_of_work::UnitOfWork;

// Re-export repositories
pub use repos::{
    CategoryRepository, ChatRepository, CommunityJoinRequestRepository, CommunityMemberRepository,
    CommunityRepository, CommunityRuleRepository, DeletedChatRepository, MessageRepository,
    ParticipantRepository, DEFAULT_MESSAGE_LIMIT,
};

// Re-export entities
pub use entities::{
    Category, Chat, ChatParticipant, Community, CommunityJoinRequest,
    CommunityMember, CommunityRule, CreateChatRequest, CreateCommunityRequest, CreateJoinRequest,
    CreateRuleRequest, DeletedChat, JoinRequestStatus, MemberRole, MembershipStatus, Message,
    ReadReceipt, SaveMessageRequest,
};

// Re-export types
pub use types::{parse_id, DatabaseError, DatabaseResult, Paginated, Pagination, DEFAULT_PAGE_LIMIT};

/// Connect to the configured database and bring its schema up to date
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config).await.map_err(|e| {
        error!(url = %config.url, error = %e, "database connection failed");
        DatabaseError::ConnectionError(format!("{e:#}"))
    })?;

    run_migrations(&pool).await.map_err(|e| {
        error!(error = %e, "database migrations failed");
        DatabaseError::MigrationError(format!("{e:#}"))
    })?;

    Ok(pool)
}
