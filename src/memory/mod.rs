//! 记忆层：对话状态、历史持久化、知识库检索

pub mod conversation;
pub mod history;
pub mod knowledge;
pub mod tokenizer;

pub use conversation::{ConversationState, Message, Role, ToolCallRequest};
pub use history::{sanitize_title, ConversationFolder, HistoryStore, HistoryWriter};
pub use knowledge::{KnowledgeBase, KnowledgeLookup};
