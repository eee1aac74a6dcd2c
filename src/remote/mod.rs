//! 托管 assistants 服务的调用契约
//!
//! 所有后端（Azure OpenAI REST / 脚本化 Mock）实现 AssistantsApi；
//! 业务层只依赖该 trait，不关心传输细节。

pub mod azure;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::core::Result;

pub use azure::AzureAssistantsClient;
pub use mock::{RunStep, ScriptedAssistantsApi};
pub use types::{
    Assistant, CreateAssistantRequest, FunctionCall, FunctionDefinition, GeneratedImage,
    ImageGeneration, MessageContent, RequiredAction, Run, RunStatus, Thread, ThreadMessage,
    ToolCall, ToolDefinition, ToolOutput,
};

/// 托管服务契约：assistant / thread / message / run / file / image
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn list_assistants(&self) -> Result<Vec<Assistant>>;

    async fn create_assistant(&self, request: &CreateAssistantRequest) -> Result<Assistant>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// 以 user 角色向线程追加一条消息
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage>;

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    /// 线程消息，最新的在前
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    async fn generate_image(&self, prompt: &str) -> Result<ImageGeneration>;
}
