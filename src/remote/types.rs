//! 托管 assistants 服务的请求/响应结构（只覆盖本服务用到的字段）

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// assistant 声明的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    CodeInterpreter,
    Function { function: FunctionDefinition },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAssistantRequest {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// run 状态；未识别的取值落到 Unknown，按非终态处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }

    /// 终态失败：failed / expired / cancelled / incomplete
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Expired | RunStatus::Cancelled | RunStatus::Incomplete
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == RunStatus::Completed || self.is_failure()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputs>,
}

impl RequiredAction {
    pub const SUBMIT_TOOL_OUTPUTS: &'static str = "submit_tool_outputs";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitToolOutputs {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// run 要求调用方执行的工具调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON 编码的参数字符串
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default = "default_message_object")]
    pub object: String,
    pub created_at: i64,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

fn default_message_object() -> String {
    "thread.message".to_string()
}

/// 消息内容片段：文本或生成的图片文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    ImageFile { image_file: ImageFile },
    #[serde(other)]
    Other,
}

impl MessageContent {
    pub fn text(value: &str) -> Self {
        MessageContent::Text {
            text: TextContent {
                value: value.to_string(),
                annotations: Vec::new(),
            },
        }
    }

    pub fn image_file(file_id: &str) -> Self {
        MessageContent::ImageFile {
            image_file: ImageFile {
                file_id: file_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest {
    pub role: String,
    pub content: String,
}

/// 列表接口的通用外层（游标分页）
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

impl<T> ListResponse<T> {
    /// 下一页的 `after` 游标；没有更多数据时为 None
    pub fn next_cursor(&self) -> Option<&str> {
        if self.has_more {
            self.last_id.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub n: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGeneration {
    pub created: i64,
    #[serde(default)]
    pub data: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_parse() {
        let run: Run = serde_json::from_value(serde_json::json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search_google", "arguments": "{\"query\":\"rust\"}"}
                    }]
                }
            }
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::RequiresAction);
        let action = run.required_action.unwrap();
        assert_eq!(action.kind, RequiredAction::SUBMIT_TOOL_OUTPUTS);
        let calls = action.submit_tool_outputs.unwrap().tool_calls;
        assert_eq!(calls[0].function.name, "search_google");
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let status: RunStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_terminal());
        assert!(RunStatus::Expired.is_failure());
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Completed.is_failure());
    }

    #[test]
    fn test_message_content_variants() {
        let msg: ThreadMessage = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "object": "thread.message",
            "created_at": 1700000000,
            "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "Here is the chart", "annotations": []}},
                {"type": "image_file", "image_file": {"file_id": "file_9"}},
                {"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
            ]
        }))
        .unwrap();
        assert_eq!(msg.content.len(), 3);
        assert!(matches!(&msg.content[0], MessageContent::Text { text } if text.value == "Here is the chart"));
        assert!(matches!(&msg.content[1], MessageContent::ImageFile { image_file } if image_file.file_id == "file_9"));
        assert!(matches!(msg.content[2], MessageContent::Other));
    }

    #[test]
    fn test_tool_definition_shape() {
        let def = ToolDefinition::CodeInterpreter;
        assert_eq!(
            serde_json::to_value(&def).unwrap(),
            serde_json::json!({"type": "code_interpreter"})
        );
    }

    #[test]
    fn test_list_response_cursor() {
        let more: ListResponse<Assistant> = serde_json::from_str(
            r#"{"object":"list","data":[{"id":"asst_1","name":"Other"}],"first_id":"asst_1","last_id":"asst_1","has_more":true}"#,
        )
        .unwrap();
        assert_eq!(more.next_cursor(), Some("asst_1"));

        let last: ListResponse<Assistant> =
            serde_json::from_str(r#"{"data":[],"last_id":"asst_9","has_more":false}"#).unwrap();
        assert_eq!(last.next_cursor(), None);

        let bare: ListResponse<Assistant> = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_eq!(bare.next_cursor(), None);
    }
}
