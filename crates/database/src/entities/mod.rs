//! Domain entities for the database layer

pub mod chat;
pub mod community;
pub mod join_request;
pub mod member;
pub mod message;
pub mod rule;

pub use chat::{Chat, ChatParticipant, CreateChatRequest, DeletedChat};
pub use community::{Category, Community, CreateCommunityRequest, MembershipStatus};
pub use join_request::{CommunityJoinRequest, CreateJoinRequest, JoinRequestStatus};
pub use member::{CommunityMember, MemberRole};
pub use message::{Message, ReadReceipt, SaveMessageRequest};
pub use rule::{CommunityRule, CreateRuleRequest};
