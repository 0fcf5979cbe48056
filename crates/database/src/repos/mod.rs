//! Database repository implementations

pub mod category_repository;
pub mod chat_repository;
pub mod community_member_repository;
pub mod community_repository;
pub mod deleted_chat_repository;
pub mod join_request_repository;
pub mod message_repository;
pub mod participant_repository;
pub mod rule_repository;

// Re-export all repositories for convenience
pub use category_repository::CategoryRepository;
pub use chat_repository::ChatRepository;
pub use community_member_repository::CommunityMemberRepository;
pub use community_repository::CommunityRepository;
pub use deleted_chat_repository::DeletedChatRepository;
pub use join_request_repository::CommunityJoinRequestRepository;
pub use message_repository::{MessageRepository, DEFAULT_MESSAGE_LIMIT};
pub use participant_repository::ParticipantRepository;
pub use rule_repository::CommunityRuleRepository;
