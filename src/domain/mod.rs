pub mod tenant;
pub mod knowledge;
pub mod conversation;

pub use tenant::Tenant;
pub use knowledge::{Document, DocumentStatus, KnowledgeBase, KnowledgeBaseStatus, KnowledgeChunk};
pub use conversation::{Conversation, ConversationStatus, Message, SenderType, User};
