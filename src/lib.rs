//! Threadline - Azure OpenAI Assistants 会话中继服务
//!
//! 模块划分：
//! - **agent**: 会话服务（注册表 + 会话存储 + 轮询 + 格式化的编排）
//! - **assistants**: 助手类型与远端 assistant 的惰性注册
//! - **auth**: 反向代理身份头解析、登出地址
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 按 (用户, 助手类型) 管理远端线程
//! - **core**: 错误类型、关闭信号与清理
//! - **message**: 请求 / 响应信封
//! - **observability**: tracing 初始化
//! - **remote**: Assistants REST 客户端抽象与实现（Azure / 脚本化 Mock）
//! - **response**: 回复格式化与图片落盘
//! - **runner**: run 启动与轮询、工具调用往返
//! - **tools**: 函数工具（search_google）与分发器
//! - **web**: axum 路由与处理函数

pub mod agent;
pub mod assistants;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod core;
pub mod message;
pub mod observability;
pub mod remote;
pub mod response;
pub mod runner;
pub mod tools;
pub mod web;

pub use agent::{ConversationService, ServiceOptions};
pub use config::{load_config, AppConfig};
