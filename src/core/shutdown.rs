//! 优雅关闭
//!
//! 进程级取消令牌由 ShutdownManager 持有：
//! 信号到达后 HTTP 服务停止接收新请求，每个请求的轮询令牌是它的子令牌，随之取消。
//! 服务停下后由 ShutdownCoordinator 依次执行清理任务（删除远端会话线程）。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::ConversationService;

/// 关闭原因，只记录第一次触发
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM（容器平台停机）
    Terminate,
    /// 服务自身无法继续运行
    Fatal(String),
}

/// 进程关闭信号
#[derive(Debug, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: OnceLock<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级令牌（交给 axum 的 graceful shutdown）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 单个请求使用的令牌：进程关闭时取消，请求结束时丢弃不影响其他请求
    pub fn request_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        if self.reason.set(reason.clone()).is_ok() {
            tracing::info!(?reason, "shutdown requested");
        }
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<&ShutdownReason> {
        self.reason.get()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 监听 Ctrl+C 与 SIGTERM，先到者触发关闭
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let reason = tokio::select! {
                r = tokio::signal::ctrl_c() => match r {
                    Ok(()) => ShutdownReason::Interrupt,
                    Err(e) => ShutdownReason::Fatal(format!("ctrl_c handler: {e}")),
                },
                _ = terminate() => ShutdownReason::Terminate,
                _ = manager.token.cancelled() => return,
            };
            manager.trigger(reason);
        });
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// 服务停止后执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    fn name(&self) -> &'static str;

    async fn cleanup(&self) -> anyhow::Result<()>;
}

/// 清理结果汇总
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

/// 按注册顺序执行清理；单个任务失败或超时不影响后续任务
pub struct ShutdownCoordinator {
    tasks: Vec<Box<dyn ShutdownCleanup>>,
    per_task_timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ShutdownCoordinator {
    pub fn new(per_task_timeout: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            per_task_timeout,
        }
    }

    pub fn register(&mut self, task: impl ShutdownCleanup + 'static) {
        self.tasks.push(Box::new(task));
    }

    pub async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for task in &self.tasks {
            let name = task.name();
            match tokio::time::timeout(self.per_task_timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!(task = name, "cleanup done");
                    report.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = name, "cleanup failed: {}", e);
                    report.failed.push(name);
                }
                Err(_) => {
                    tracing::warn!(task = name, timeout = ?self.per_task_timeout, "cleanup timed out");
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

/// 删除本进程创建且仍在册的远端线程
pub struct ConversationCleanup {
    service: Arc<ConversationService>,
}

impl ConversationCleanup {
    pub fn new(service: Arc<ConversationService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for ConversationCleanup {
    fn name(&self) -> &'static str {
        "conversations"
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let deleted = self.service.shutdown().await;
        tracing::info!(deleted, "conversation threads released");
        Ok(())
    }
}
