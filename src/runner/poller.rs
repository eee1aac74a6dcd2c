//! run 轮询
//!
//! 提交用户消息并启动 run 后，按固定间隔（或指数退避）拉取 run 状态：
//! requires_action 时分发全部工具调用并提交输出；completed 返回；
//! failed / expired / cancelled / incomplete 报 RunFailed；步数耗尽报 RunTimedOut。
//! 等待期间可被取消令牌打断。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{BackoffKind, PollSection};
use crate::core::{RelayError, Result};
use crate::remote::{AssistantsApi, RequiredAction, Run, RunStatus, ToolOutput};
use crate::tools::ToolDispatcher;

/// 轮询间隔策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// 每步翻倍，不超过 max
    Exponential { max: Duration },
}

/// 轮询策略：步数上限、基础间隔、退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_steps: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_steps: 10,
            interval: Duration::from_secs(3),
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    pub fn from_config(cfg: &PollSection) -> Self {
        let backoff = match cfg.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max: Duration::from_secs(cfg.max_interval_secs),
            },
        };
        Self {
            max_steps: cfg.max_steps,
            interval: Duration::from_secs(cfg.interval_secs),
            backoff,
        }
    }

    /// 第 step 次（从 0 起）轮询之后的等待时长
    pub fn delay_for(&self, step: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max } => {
                let factor = 1u32.checked_shl(step.min(16)).unwrap_or(u32::MAX);
                self.interval.saturating_mul(factor).min(max)
            }
        }
    }
}

/// 向线程追加用户消息并启动 run
pub async fn start_turn(
    api: &dyn AssistantsApi,
    thread_id: &str,
    assistant_id: &str,
    content: &str,
    instructions: &str,
) -> Result<Run> {
    api.create_message(thread_id, content).await?;
    let run = api
        .create_run(thread_id, assistant_id, Some(instructions))
        .await?;
    tracing::debug!(thread_id, run_id = %run.id, "run started");
    Ok(run)
}

/// 轮询 run 直到 completed；失败终态、步数耗尽、取消都返回错误
pub async fn poll_until_complete(
    api: &dyn AssistantsApi,
    dispatcher: &ToolDispatcher,
    thread_id: &str,
    run_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Run> {
    for step in 0..policy.max_steps {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        let mut run = api.retrieve_run(thread_id, run_id).await?;
        tracing::debug!(thread_id, run_id, step, status = %run.status, "poll");

        if run.status == RunStatus::RequiresAction {
            let outputs = collect_tool_outputs(dispatcher, &run).await?;
            run = api.submit_tool_outputs(thread_id, run_id, &outputs).await?;
        }

        if run.status == RunStatus::Completed {
            tracing::debug!(thread_id, run_id, "run completed");
            return Ok(run);
        }
        if run.status.is_failure() {
            let reason = run
                .last_error
                .as_ref()
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "no error details".to_string());
            tracing::error!(thread_id, run_id, status = %run.status, %reason, "run ended without completing");
            return Err(RelayError::RunFailed {
                status: run.status,
                reason,
            });
        }

        if step + 1 == policy.max_steps {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            _ = tokio::time::sleep(policy.delay_for(step)) => {}
        }
    }

    tracing::warn!(thread_id, run_id, steps = policy.max_steps, "run poll budget exhausted");
    Err(RelayError::RunTimedOut {
        steps: policy.max_steps,
    })
}

/// 执行 run 请求的全部函数调用；先校验全部工具名，任一未知则不执行任何工具
async fn collect_tool_outputs(dispatcher: &ToolDispatcher, run: &Run) -> Result<Vec<ToolOutput>> {
    let Some(action) = run.required_action.as_ref() else {
        return Ok(Vec::new());
    };
    if action.kind != RequiredAction::SUBMIT_TOOL_OUTPUTS {
        tracing::warn!(kind = %action.kind, "unsupported required action");
        return Ok(Vec::new());
    }
    let calls: Vec<_> = action
        .submit_tool_outputs
        .iter()
        .flat_map(|s| s.tool_calls.iter())
        .filter(|c| c.kind == "function")
        .collect();

    for call in &calls {
        dispatcher.resolve(&call.function.name)?;
    }

    let mut outputs = Vec::with_capacity(calls.len());
    for call in calls {
        let output = dispatcher.dispatch(&call.function).await?;
        outputs.push(ToolOutput {
            tool_call_id: call.id.clone(),
            output,
        });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RunStep, ScriptedAssistantsApi, ToolCall};
    use crate::tools::{SearchItem, WebSearch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSearch {
        count: AtomicUsize,
    }

    #[async_trait]
    impl WebSearch for CountingSearch {
        async fn search(&self, query: &str) -> Result<Vec<SearchItem>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SearchItem {
                title: query.to_string(),
                link: "https://example.com".to_string(),
                snippet: String::new(),
            }])
        }
    }

    fn fast_policy(max_steps: u32) -> PollPolicy {
        PollPolicy {
            max_steps,
            interval: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    async fn started(api: &ScriptedAssistantsApi) -> (String, String) {
        let thread = api.create_thread().await.unwrap();
        let run = start_turn(api, &thread.id, "asst_1", "hello", "be brief")
            .await
            .unwrap();
        (thread.id, run.id)
    }

    #[tokio::test]
    async fn test_requires_action_dispatches_each_call_once() {
        let api = ScriptedAssistantsApi::new().with_script(vec![
            RunStep::Status(RunStatus::InProgress),
            RunStep::RequiresAction(vec![
                ToolCall::function("call_a", "search_google", serde_json::json!({"query": "a"})),
                ToolCall::function("call_b", "search_google", serde_json::json!({"query": "b"})),
            ]),
            RunStep::Status(RunStatus::Completed),
        ]);
        let search = Arc::new(CountingSearch::default());
        let dispatcher = ToolDispatcher::new(search.clone(), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let run = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(search.count.load(Ordering::SeqCst), 2);
        let submitted = api.submitted_outputs();
        assert_eq!(submitted.len(), 1);
        let ids: Vec<_> = submitted[0].iter().map(|o| o.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
        assert_eq!(api.retrieve_calls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_before_submission() {
        let api = ScriptedAssistantsApi::new().with_script(vec![RunStep::RequiresAction(vec![
            ToolCall::function("call_a", "search_google", serde_json::json!({"query": "a"})),
            ToolCall::function("call_b", "delete_everything", serde_json::json!({})),
        ])]);
        let search = Arc::new(CountingSearch::default());
        let dispatcher = ToolDispatcher::new(search.clone(), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let err = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::UnknownTool(name) if name == "delete_everything"));
        assert_eq!(search.count.load(Ordering::SeqCst), 0);
        assert!(api.submitted_outputs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_is_an_error() {
        let api = ScriptedAssistantsApi::new().with_script(vec![
            RunStep::Status(RunStatus::Queued),
            RunStep::Status(RunStatus::Failed),
        ]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let err = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::RunFailed { status: RunStatus::Failed, .. }));
    }

    #[tokio::test]
    async fn test_expired_run_is_an_error() {
        let api = ScriptedAssistantsApi::new().with_script(vec![RunStep::Status(RunStatus::Expired)]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let err = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::RunFailed { status: RunStatus::Expired, .. }));
    }

    #[tokio::test]
    async fn test_step_budget_exhausted() {
        let api = ScriptedAssistantsApi::new()
            .with_script(vec![RunStep::Status(RunStatus::InProgress); 5]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let err = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RelayError::RunTimedOut { steps: 3 }));
        assert_eq!(api.retrieve_calls(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_does_not_wait_after_last_poll() {
        let api = ScriptedAssistantsApi::new()
            .with_script(vec![RunStep::Status(RunStatus::InProgress); 2]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;
        let policy = PollPolicy {
            max_steps: 1,
            interval: Duration::from_secs(60),
            backoff: Backoff::Fixed,
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            poll_until_complete(&api, &dispatcher, &thread_id, &run_id, &policy, &CancellationToken::new()),
        )
        .await
        .expect("poll loop waited after its last allowed poll");

        assert!(matches!(result, Err(RelayError::RunTimedOut { steps: 1 })));
        assert_eq!(api.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelling_status_keeps_polling() {
        let api = ScriptedAssistantsApi::new().with_script(vec![
            RunStep::Status(RunStatus::Cancelling),
            RunStep::Status(RunStatus::Completed),
        ]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;

        let run = poll_until_complete(
            &api,
            &dispatcher,
            &thread_id,
            &run_id,
            &fast_policy(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(api.retrieve_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let api = ScriptedAssistantsApi::new()
            .with_script(vec![RunStep::Status(RunStatus::InProgress); 5]);
        let dispatcher = ToolDispatcher::new(Arc::new(CountingSearch::default()), Duration::from_secs(1));
        let (thread_id, run_id) = started(&api).await;
        let policy = PollPolicy {
            max_steps: 5,
            interval: Duration::from_secs(60),
            backoff: Backoff::Fixed,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = poll_until_complete(&api, &dispatcher, &thread_id, &run_id, &policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Cancelled));
        assert_eq!(api.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_turn_posts_message_and_instructions() {
        let api = ScriptedAssistantsApi::new();
        let thread = api.create_thread().await.unwrap();
        let run = start_turn(&api, &thread.id, "asst_1", "2+2?", "Answer tersely.")
            .await
            .unwrap();
        assert_eq!(api.user_messages(&thread.id), vec!["2+2?".to_string()]);
        assert_eq!(api.run_instructions(&run.id).as_deref(), Some("Answer tersely."));
    }

    #[test]
    fn test_delay_for() {
        let fixed = PollPolicy::default();
        assert_eq!(fixed.delay_for(0), Duration::from_secs(3));
        assert_eq!(fixed.delay_for(7), Duration::from_secs(3));

        let exp = PollPolicy {
            max_steps: 10,
            interval: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                max: Duration::from_secs(10),
            },
        };
        assert_eq!(exp.delay_for(0), Duration::from_secs(1));
        assert_eq!(exp.delay_for(2), Duration::from_secs(4));
        assert_eq!(exp.delay_for(9), Duration::from_secs(10));
        assert_eq!(exp.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_from_config() {
        let cfg = PollSection {
            max_steps: 4,
            interval_secs: 2,
            backoff: BackoffKind::Exponential,
            max_interval_secs: 8,
        };
        let policy = PollPolicy::from_config(&cfg);
        assert_eq!(policy.max_steps, 4);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                max: Duration::from_secs(8)
            }
        );
    }
}
