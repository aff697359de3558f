//! 记忆层：单次任务的对话历史

pub mod conversation;

pub use conversation::{Conversation, Message, Role};
