//! 对外的请求 / 响应信封

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单条对话消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// 会话请求：历史消息 + 最新一条；history_metadata 原样回传
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "empty_object")]
    pub history_metadata: Value,
}

impl TurnRequest {
    /// 最新一条消息的内容
    pub fn latest_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub messages: Vec<ChatMessage>,
}

/// 成功响应信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub choices: Vec<Choice>,
    pub history_metadata: Value,
}

impl ChatResponse {
    /// 单条 assistant 消息的响应
    pub fn single(
        id: String,
        model: &str,
        created: i64,
        object: Option<String>,
        content: String,
        history_metadata: Value,
    ) -> Self {
        Self {
            id,
            model: model.to_string(),
            created,
            object,
            choices: vec![Choice {
                messages: vec![ChatMessage::assistant(&content)],
            }],
            history_metadata,
        }
    }

    /// 第一个 choice 的第一条消息内容
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.messages.first())
            .map(|m| m.content.as_str())
    }
}
