//! 持久层：智能体预设与长期记忆（SQLite / 内存）

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{
    default_agents, AgentStore, InMemoryStore, MemoryKind, MemoryRecord, Priority, SavedAgent,
    StoreError, HIGH_PRIORITY_LIMIT, SEARCH_LIMIT,
};
