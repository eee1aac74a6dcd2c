//! 助手类型与对应的远端 assistant 配置

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::RelayError;
use crate::remote::ToolDefinition;
use crate::tools::ToolKind;

/// 助手类型：math / web 对应远端 assistant，image 走一次性生图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantKind {
    Math,
    Web,
    Image,
}

/// 远端 assistant 的名称、指令与工具声明
#[derive(Debug, Clone)]
pub struct AssistantProfile {
    pub name: &'static str,
    pub instructions: &'static str,
    pub tools: Vec<ToolDefinition>,
}

impl AssistantKind {
    pub const ALL: [AssistantKind; 3] = [AssistantKind::Math, AssistantKind::Web, AssistantKind::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantKind::Math => "math",
            AssistantKind::Web => "web",
            AssistantKind::Image => "image",
        }
    }

    /// 远端 assistant 配置；image 没有对应的 assistant
    pub fn profile(&self) -> Option<AssistantProfile> {
        match self {
            AssistantKind::Math => Some(AssistantProfile {
                name: "Math Tutor",
                instructions: "You are a personal math tutor. Write and run code to answer math questions.",
                tools: vec![ToolDefinition::CodeInterpreter],
            }),
            AssistantKind::Web => Some(AssistantProfile {
                name: "Web Assistant",
                instructions: "You are a personal web assistant. Write and run code to answer web development questions. Use search_google when the answer depends on current information from the web.",
                tools: vec![
                    ToolDefinition::CodeInterpreter,
                    ToolKind::SearchGoogle.declaration(),
                ],
            }),
            AssistantKind::Image => None,
        }
    }
}

impl fmt::Display for AssistantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssistantKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "math" => Ok(AssistantKind::Math),
            "web" => Ok(AssistantKind::Web),
            "image" => Ok(AssistantKind::Image),
            _ => Err(RelayError::UnknownAssistant(s.to_string())),
        }
    }
}
