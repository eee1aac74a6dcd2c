//! 助手：类型定义与远端 assistant 注册表

pub mod kind;
pub mod registry;

pub use kind::{AssistantKind, AssistantProfile};
pub use registry::{AssistantHandle, AssistantRegistry};
