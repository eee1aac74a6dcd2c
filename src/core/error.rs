//! 错误类型
//!
//! 远端服务、工具、轮询与身份解析的失败统一收敛为 RelayError；
//! HTTP 层据此决定返回 500 错误信封、400 或登出重定向。

use thiserror::Error;

use crate::assistants::AssistantKind;
use crate::remote::RunStatus;

/// 身份头解析失败：存在 Principal-Id 但缺少其他必需头
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Missing identity header: {0}")]
    MissingHeader(&'static str),

    #[error("Identity header is not valid UTF-8: {0}")]
    InvalidHeader(&'static str),
}

/// 一次会话请求过程中可能出现的错误
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Unknown assistant type: {0}")]
    UnknownAssistant(String),

    /// image 类型不对应远端 assistant，走一次性生图路径
    #[error("Assistant type {0} has no remote assistant")]
    NotAnAssistant(AssistantKind),

    #[error("Request contains no messages")]
    EmptyConversation,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run {status}: {reason}")]
    RunFailed { status: RunStatus, reason: String },

    /// 轮询步数耗尽仍未到达终态
    #[error("Run did not complete within {steps} polls")]
    RunTimedOut { steps: u32 },

    #[error("Function requested by the model does not exist: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Thread {0} has no assistant reply")]
    NoReply(String),

    #[error("Image generation returned no image")]
    NoImage,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

impl RelayError {
    /// 远端资源不存在（HTTP 404）
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelayError::Remote { status: 404, .. })
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
