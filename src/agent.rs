//! 会话服务
//!
//! 供 HTTP 层调用的无界面编排逻辑：
//! 助手注册表取 assistant，会话存储取线程，提交消息并启动 run，
//! 轮询到完成后格式化回复。image 类型走一次性生图，不经过线程。

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::assistants::{AssistantKind, AssistantRegistry};
use crate::auth::UserIdentity;
use crate::config::AppConfig;
use crate::conversation::{ConversationStore, ResetPolicy};
use crate::core::{RelayError, Result};
use crate::message::{ChatResponse, TurnRequest};
use crate::remote::AssistantsApi;
use crate::response::{format_image_generation, format_thread_reply, ImageStore};
use crate::runner::{poll_until_complete, start_turn, PollPolicy};
use crate::tools::{GoogleSearchTool, ToolDispatcher, UnconfiguredSearch, WebSearch};

/// 会话服务的可调参数
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// 创建 assistant 使用的模型部署名
    pub deployment: String,
    pub model_label: String,
    pub images: ImageStore,
    pub poll: PollPolicy,
    pub reset_policy: ResetPolicy,
}

impl ServiceOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            deployment: cfg.azure.deployment.clone(),
            model_label: cfg.response.model_label.clone(),
            images: ImageStore::new(cfg.app.images_dir.clone()),
            poll: PollPolicy::from_config(&cfg.poll),
            reset_policy: cfg.conversation.reset_policy,
        }
    }
}

/// 从配置构建工具分发器；搜索凭据缺失时 search_google 调用会报配置错误
pub fn create_dispatcher(cfg: &AppConfig) -> ToolDispatcher {
    let search: Arc<dyn WebSearch> = match GoogleSearchTool::from_config(&cfg.search) {
        Ok(tool) => Arc::new(tool),
        Err(e) => {
            tracing::warn!("search_google disabled: {}", e);
            Arc::new(UnconfiguredSearch)
        }
    };
    ToolDispatcher::new(search, Duration::from_secs(cfg.search.timeout_secs))
}

/// 进程级共享状态：远端客户端、助手注册表、会话存储、工具分发器
pub struct ConversationService {
    api: Arc<dyn AssistantsApi>,
    registry: AssistantRegistry,
    store: ConversationStore,
    dispatcher: ToolDispatcher,
    options: ServiceOptions,
}

impl ConversationService {
    pub fn new(api: Arc<dyn AssistantsApi>, dispatcher: ToolDispatcher, options: ServiceOptions) -> Self {
        Self {
            api,
            registry: AssistantRegistry::new(),
            store: ConversationStore::new(options.reset_policy),
            dispatcher,
            options,
        }
    }

    pub fn images(&self) -> &ImageStore {
        &self.options.images
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn registry(&self) -> &AssistantRegistry {
        &self.registry
    }

    /// 处理一次会话请求
    pub async fn converse(
        &self,
        user: &UserIdentity,
        kind: AssistantKind,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let content = request
            .latest_content()
            .ok_or(RelayError::EmptyConversation)?
            .to_string();
        tracing::debug!(user_id = %user.user_principal_id, %kind, "content: {}", content);
        tracing::debug!("history_metadata: {}", request.history_metadata);

        if kind == AssistantKind::Image {
            return self.generate_image(&content, request.history_metadata).await;
        }

        let api = self.api.as_ref();
        let assistant = self
            .registry
            .get_or_create(api, kind, &self.options.deployment)
            .await?;
        let conversation = self
            .store
            .get_or_reset(api, &user.user_principal_id, kind, request.messages.len())
            .await?;
        let thread_id = conversation.thread_id.as_str();

        let instructions = run_instructions(kind, &user.user_name);
        let run = start_turn(api, thread_id, &assistant.id, &content, &instructions).await?;

        tracing::debug!(thread_id, run_id = %run.id, "processing ...");
        poll_until_complete(
            api,
            &self.dispatcher,
            thread_id,
            &run.id,
            &self.options.poll,
            cancel,
        )
        .await?;

        format_thread_reply(
            api,
            thread_id,
            request.history_metadata,
            &self.options.images,
            &self.options.model_label,
        )
        .await
    }

    async fn generate_image(&self, prompt: &str, history_metadata: serde_json::Value) -> Result<ChatResponse> {
        let generation = self.api.generate_image(prompt).await?;
        format_image_generation(&generation, history_metadata, &self.options.model_label)
    }

    /// 丢弃调用方在某助手类型下的会话（删除远端线程）
    pub async fn reset(&self, user: &UserIdentity, kind: AssistantKind) -> Result<bool> {
        self.store
            .discard(self.api.as_ref(), &user.user_principal_id, kind)
            .await
    }

    /// 进程退出：删除仍在册的远端线程，返回删除数量
    pub async fn shutdown(&self) -> usize {
        self.store.shutdown(self.api.as_ref()).await
    }
}

/// run 级指令：助手类型的指令 + 称呼与当前时间
pub fn run_instructions(kind: AssistantKind, user_name: &str) -> String {
    let base = kind.profile().map(|p| p.instructions).unwrap_or_default();
    format!(
        "{base} Please address the user as {user_name}. Be assertive, accurate, and polite. \
         Ask if the user has further questions. The current date and time is: {}.",
        Local::now().format("%x %X")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sample_user;
    use crate::message::ChatMessage;
    use crate::remote::{MessageContent, RunStep, RunStatus, ScriptedAssistantsApi};
    use crate::runner::Backoff;

    fn service(api: Arc<ScriptedAssistantsApi>, dir: &std::path::Path) -> ConversationService {
        let options = ServiceOptions {
            deployment: "gpt-35-turbo".to_string(),
            model_label: "gpt-3.5-turbo".to_string(),
            images: ImageStore::new(dir),
            poll: PollPolicy {
                max_steps: 10,
                interval: Duration::ZERO,
                backoff: Backoff::Fixed,
            },
            reset_policy: ResetPolicy::MultiMessage,
        };
        ConversationService::new(api, ToolDispatcher::new(Arc::new(UnconfiguredSearch), Duration::from_secs(1)), options)
    }

    fn request(contents: &[&str]) -> TurnRequest {
        TurnRequest {
            messages: contents.iter().map(|c| ChatMessage::user(c)).collect(),
            history_metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_converse_math() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistantsApi::new().with_reply(vec![MessageContent::text("4")]));
        let svc = service(api.clone(), dir.path());
        let user = sample_user();

        let resp = svc
            .converse(&user, AssistantKind::Math, request(&["2+2?"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.content(), Some("4"));
        let thread = svc.store().get(&user.user_principal_id, AssistantKind::Math).await.unwrap();
        assert_eq!(api.user_messages(&thread.thread_id), vec!["2+2?".to_string()]);
    }

    #[tokio::test]
    async fn test_follow_up_reuses_thread_and_resend_resets() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistantsApi::new().with_reply(vec![MessageContent::text("ok")]));
        let svc = service(api.clone(), dir.path());
        let user = sample_user();
        let cancel = CancellationToken::new();

        svc.converse(&user, AssistantKind::Math, request(&["a"]), &cancel).await.unwrap();
        svc.converse(&user, AssistantKind::Math, request(&["b"]), &cancel).await.unwrap();
        assert_eq!(api.created_threads().len(), 1);

        svc.converse(&user, AssistantKind::Math, request(&["a", "b", "c"]), &cancel)
            .await
            .unwrap();
        assert_eq!(api.created_threads().len(), 2);
        assert_eq!(api.deleted_threads().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_request() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Arc::new(ScriptedAssistantsApi::new()), dir.path());
        let err = svc
            .converse(&sample_user(), AssistantKind::Math, request(&[]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::EmptyConversation));
    }

    #[tokio::test]
    async fn test_failed_run_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(
            ScriptedAssistantsApi::new().with_script(vec![RunStep::Status(RunStatus::Failed)]),
        );
        let svc = service(api, dir.path());
        let err = svc
            .converse(&sample_user(), AssistantKind::Web, request(&["news?"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::RunFailed { .. }));
    }

    #[tokio::test]
    async fn test_image_kind_uses_generation() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedAssistantsApi::new().with_image_url("https://img.example.com/1.png"));
        let svc = service(api.clone(), dir.path());

        let resp = svc
            .converse(&sample_user(), AssistantKind::Image, request(&["a red fox"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(resp.content().unwrap().contains("https://img.example.com/1.png"));
        assert!(api.created_threads().is_empty());
        assert_eq!(api.created_assistants(), 0);
    }

    #[test]
    fn test_run_instructions() {
        let text = run_instructions(AssistantKind::Math, "Jane Doe");
        assert!(text.starts_with("You are a personal math tutor."));
        assert!(text.contains("Please address the user as Jane Doe."));
        assert!(text.contains("The current date and time is: "));
    }
}
