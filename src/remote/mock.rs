//! 脚本化的 assistants 服务（用于测试，无需网络）
//!
//! retrieve_run 按脚本依次返回状态；脚本耗尽后返回 completed，并把预设回复写入线程。
//! 所有调用都会记录下来，便于断言创建/删除/提交了什么。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{RelayError, Result};
use crate::remote::types::{RequiredAction, SubmitToolOutputs};
use crate::remote::{
    Assistant, AssistantsApi, CreateAssistantRequest, GeneratedImage, ImageGeneration,
    MessageContent, Run, RunStatus, Thread, ThreadMessage, ToolCall, ToolOutput,
};

/// run 脚本中的一步
#[derive(Debug, Clone)]
pub enum RunStep {
    Status(RunStatus),
    /// requires_action，携带待执行的工具调用
    RequiresAction(Vec<ToolCall>),
}

#[derive(Default)]
struct MockState {
    assistants: Vec<Assistant>,
    created_assistants: Vec<CreateAssistantRequest>,
    threads: Vec<String>,
    deleted_threads: Vec<String>,
    messages: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, (String, Option<String>)>,
    script: VecDeque<RunStep>,
    reply: Vec<MessageContent>,
    files: HashMap<String, Vec<u8>>,
    submitted: Vec<Vec<ToolOutput>>,
    retrieve_calls: usize,
    image_url: Option<String>,
}

/// 脚本化 Mock：线程、消息、run 都在内存里
#[derive(Default)]
pub struct ScriptedAssistantsApi {
    state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl ScriptedAssistantsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置远端已存在的 assistant（用于名称扫描命中）
    pub fn with_assistant(self, id: &str, name: &str) -> Self {
        self.lock().assistants.push(Assistant {
            id: id.to_string(),
            name: Some(name.to_string()),
        });
        self
    }

    pub fn with_script(self, steps: Vec<RunStep>) -> Self {
        self.lock().script = steps.into();
        self
    }

    /// run 完成时 assistant 回复的内容
    pub fn with_reply(self, content: Vec<MessageContent>) -> Self {
        self.lock().reply = content;
        self
    }

    pub fn with_file(self, file_id: &str, bytes: &[u8]) -> Self {
        self.lock().files.insert(file_id.to_string(), bytes.to_vec());
        self
    }

    pub fn with_image_url(self, url: &str) -> Self {
        self.lock().image_url = Some(url.to_string());
        self
    }

    pub fn created_assistants(&self) -> usize {
        self.lock().created_assistants.len()
    }

    pub fn created_threads(&self) -> Vec<String> {
        self.lock().threads.clone()
    }

    pub fn deleted_threads(&self) -> Vec<String> {
        self.lock().deleted_threads.clone()
    }

    /// 每次 submit_tool_outputs 提交的输出
    pub fn submitted_outputs(&self) -> Vec<Vec<ToolOutput>> {
        self.lock().submitted.clone()
    }

    pub fn retrieve_calls(&self) -> usize {
        self.lock().retrieve_calls
    }

    /// 某线程上 user 角色的消息文本
    pub fn user_messages(&self, thread_id: &str) -> Vec<String> {
        self.lock()
            .messages
            .get(thread_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.role == "user")
                    .flat_map(|m| m.content.iter())
                    .filter_map(|c| match c {
                        MessageContent::Text { text } => Some(text.value.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 某 run 创建时携带的 instructions
    pub fn run_instructions(&self, run_id: &str) -> Option<String> {
        self.lock().runs.get(run_id).and_then(|(_, i)| i.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{n}")
    }

    fn run(&self, id: &str, thread_id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            status,
            required_action: None,
            last_error: None,
        }
    }

    fn push_message(
        &self,
        state: &mut MockState,
        thread_id: &str,
        role: &str,
        content: Vec<MessageContent>,
    ) -> ThreadMessage {
        let message = ThreadMessage {
            id: self.next_id("msg"),
            object: "thread.message".to_string(),
            created_at: 1_700_000_000 + self.next_id.load(Ordering::Relaxed) as i64,
            role: role.to_string(),
            content,
        };
        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }

    fn ensure_thread(state: &MockState, thread_id: &str) -> Result<()> {
        if state.threads.iter().any(|t| t == thread_id)
            && !state.deleted_threads.iter().any(|t| t == thread_id)
        {
            Ok(())
        } else {
            Err(RelayError::Remote {
                status: 404,
                body: format!("No thread found with id '{thread_id}'"),
            })
        }
    }
}

#[async_trait]
impl AssistantsApi for ScriptedAssistantsApi {
    async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        Ok(self.lock().assistants.clone())
    }

    async fn create_assistant(&self, request: &CreateAssistantRequest) -> Result<Assistant> {
        let assistant = Assistant {
            id: self.next_id("asst"),
            name: Some(request.name.clone()),
        };
        let mut state = self.lock();
        state.created_assistants.push(request.clone());
        state.assistants.push(assistant.clone());
        Ok(assistant)
    }

    async fn create_thread(&self) -> Result<Thread> {
        let id = self.next_id("thread");
        self.lock().threads.push(id.clone());
        Ok(Thread { id })
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_thread(&state, thread_id)?;
        state.deleted_threads.push(thread_id.to_string());
        Ok(())
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let mut state = self.lock();
        Self::ensure_thread(&state, thread_id)?;
        Ok(self.push_message(&mut state, thread_id, "user", vec![MessageContent::text(content)]))
    }

    async fn create_run(
        &self,
        thread_id: &str,
        _assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run> {
        let id = self.next_id("run");
        let mut state = self.lock();
        Self::ensure_thread(&state, thread_id)?;
        state.runs.insert(
            id.clone(),
            (thread_id.to_string(), instructions.map(String::from)),
        );
        Ok(self.run(&id, thread_id, RunStatus::Queued))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.lock();
        state.retrieve_calls += 1;
        let step = state
            .script
            .pop_front()
            .unwrap_or(RunStep::Status(RunStatus::Completed));
        let mut run = self.run(run_id, thread_id, RunStatus::Queued);
        match step {
            RunStep::Status(status) => {
                run.status = status;
                if status == RunStatus::Completed {
                    let reply = state.reply.clone();
                    if !reply.is_empty() {
                        self.push_message(&mut state, thread_id, "assistant", reply);
                    }
                }
            }
            RunStep::RequiresAction(tool_calls) => {
                run.status = RunStatus::RequiresAction;
                run.required_action = Some(RequiredAction {
                    kind: RequiredAction::SUBMIT_TOOL_OUTPUTS.to_string(),
                    submit_tool_outputs: Some(SubmitToolOutputs { tool_calls }),
                });
            }
        }
        Ok(run)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        self.lock().submitted.push(outputs.to_vec());
        Ok(self.run(run_id, thread_id, RunStatus::Queued))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let state = self.lock();
        let mut messages = state.messages.get(thread_id).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        self.lock()
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| RelayError::Remote {
                status: 404,
                body: format!("No file found with id '{file_id}'"),
            })
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageGeneration> {
        let url = self.lock().image_url.clone();
        Ok(ImageGeneration {
            created: 1_700_000_000,
            data: url
                .into_iter()
                .map(|url| GeneratedImage {
                    url: Some(url),
                    revised_prompt: Some(prompt.to_string()),
                })
                .collect(),
        })
    }
}
