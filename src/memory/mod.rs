//! 记忆层：对话消息、回合状态机、上下文快照 / 摘要存储、Token 估算与持久化

pub mod context_store;
pub mod conversation;
pub mod persistence;
pub mod token_budget;
pub mod turn;
pub mod turn_store;

pub use context_store::{ContextMemoryExport, ContextMemoryStore, ContextSnapshot, Summary};
pub use conversation::{Message, Role};
pub use persistence::ContextPersistence;
pub use token_budget::TokenEstimator;
pub use turn::{ThinkingRound, ToolCallResult, Turn, TurnStatus};
pub use turn_store::{SessionExport, TurnMemoryStore};
