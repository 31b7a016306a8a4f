pub mod chunk_store;
pub mod conversation_store;
pub mod memory;
pub mod pool;
pub mod vector_index;

pub use chunk_store::{ChunkStore, NewChunk, PgChunkStore};
pub use conversation_store::{ConversationStore, PgConversationStore};
pub use memory::InMemoryStore;
pub use pool::DbPool;
pub use vector_index::{DisabledVectorIndex, GuardedVectorIndex, PgVectorIndex, ScoredChunk, SharedVectorIndex, VectorIndex};
