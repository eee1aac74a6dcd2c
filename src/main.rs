//! Threadline 入口
//!
//! 加载配置、初始化日志、构建会话服务并启动 HTTP 服务；
//! 收到 Ctrl+C / SIGTERM 后停止接收请求，取消进行中的轮询，再清理远端线程。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use threadline::agent::{create_dispatcher, ConversationService, ServiceOptions};
use threadline::config::load_config;
use threadline::core::{ConversationCleanup, ShutdownCoordinator, ShutdownManager};
use threadline::observability;
use threadline::remote::AzureAssistantsClient;
use threadline::web::{create_router, AppState, AuthSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    observability::init(cfg.app.debug);

    let api = AzureAssistantsClient::from_config(&cfg.azure).context("Failed to create Azure client")?;
    let dispatcher = create_dispatcher(&cfg);
    let service = Arc::new(ConversationService::new(
        Arc::new(api),
        dispatcher,
        ServiceOptions::from_config(&cfg),
    ));

    tokio::fs::create_dir_all(&cfg.app.images_dir)
        .await
        .with_context(|| format!("Failed to create {}", cfg.app.images_dir.display()))?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(cfg.azure.timeout_secs));
    if cfg.conversation.cleanup_on_shutdown {
        coordinator.register(ConversationCleanup::new(service.clone()));
    }

    let state = Arc::new(AppState {
        service,
        auth: AuthSettings::from_config(&cfg),
        shutdown: shutdown.clone(),
    });
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Threadline listening on http://{}", addr);

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("Server error")?;

    let report = coordinator.run_cleanup().await;
    tracing::info!(reason = ?shutdown.reason(), failed = ?report.failed, "Threadline stopped");
    Ok(())
}
