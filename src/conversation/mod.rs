//! 会话：用户与助手类型到远端线程的映射

pub mod store;

pub use store::{ConversationHandle, ConversationStore, ResetPolicy};
