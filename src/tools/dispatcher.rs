//! 工具分发
//!
//! 工具名是封闭枚举 ToolKind，未知名称直接报 UnknownTool（对整个请求致命）。
//! dispatch 在超时内执行工具，并输出结构化审计日志（JSON）。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::{RelayError, Result};
use crate::remote::{FunctionCall, FunctionDefinition, ToolDefinition};
use crate::tools::WebSearch;

/// 可由远端 run 请求执行的工具
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SearchGoogle,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SearchGoogle => "search_google",
        }
    }

    /// 创建 assistant 时的 function 工具声明
    pub fn declaration(&self) -> ToolDefinition {
        match self {
            ToolKind::SearchGoogle => ToolDefinition::Function {
                function: FunctionDefinition {
                    name: self.name().to_string(),
                    description: Some(
                        "Search the web with Google and return the top results (title, link, snippet)."
                            .to_string(),
                    ),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The search query"
                            }
                        },
                        "required": ["query"]
                    }),
                },
            },
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search_google" => Ok(ToolKind::SearchGoogle),
            _ => Err(RelayError::UnknownTool(s.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// 工具分发器：持有各工具后端与单次调用超时
pub struct ToolDispatcher {
    search: Arc<dyn WebSearch>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(search: Arc<dyn WebSearch>, timeout: Duration) -> Self {
        Self { search, timeout }
    }

    /// 解析工具名；未注册的名称返回 UnknownTool
    pub fn resolve(&self, name: &str) -> Result<ToolKind> {
        name.parse()
    }

    /// 执行一次函数调用，返回提交给 run 的输出字符串
    pub async fn dispatch(&self, call: &FunctionCall) -> Result<String> {
        let kind = self.resolve(&call.name)?;
        let args: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.arguments)?
        };

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.invoke(kind, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": kind.name(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(RelayError::ToolTimeout(kind.name().to_string())),
        }
    }

    async fn invoke(&self, kind: ToolKind, args: Value) -> Result<String> {
        match kind {
            ToolKind::SearchGoogle => {
                let args: SearchArgs = serde_json::from_value(args)
                    .map_err(|e| RelayError::ToolFailed(format!("search_google: {e}")))?;
                let items = self.search.search(&args.query).await?;
                Ok(serde_json::to_string(&items)?)
            }
        }
    }
}

const ARGS_PREVIEW_CHARS: usize = 200;

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
