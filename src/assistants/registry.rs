//! 助手注册表：AssistantKind -> 远端 assistant 句柄，进程内缓存
//!
//! 首次请求某类型时先列出远端 assistant 按名称线性查找，找不到再创建。
//! 每个类型一个 OnceCell，同进程内并发的首次请求只会触发一次查找/创建；
//! 多进程之间仍可能重复创建（按名称去重，不是唯一键）。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::assistants::{AssistantKind, AssistantProfile};
use crate::core::{RelayError, Result};
use crate::remote::{AssistantsApi, CreateAssistantRequest};

/// 远端 assistant 句柄：创建后整个进程生命周期内不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantHandle {
    pub id: String,
    pub name: String,
}

#[derive(Default)]
pub struct AssistantRegistry {
    slots: Mutex<HashMap<AssistantKind, Arc<OnceCell<AssistantHandle>>>>,
}

impl AssistantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回缓存的句柄；未缓存时查找或创建远端 assistant
    pub async fn get_or_create(
        &self,
        api: &dyn AssistantsApi,
        kind: AssistantKind,
        model_deployment: &str,
    ) -> Result<AssistantHandle> {
        let profile = kind.profile().ok_or(RelayError::NotAnAssistant(kind))?;
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(kind).or_default().clone()
        };
        let handle = slot
            .get_or_try_init(|| find_or_create(api, &profile, model_deployment))
            .await?;
        Ok(handle.clone())
    }

    /// 已缓存的句柄（不触发远端调用）
    pub async fn cached(&self, kind: AssistantKind) -> Option<AssistantHandle> {
        let slots = self.slots.lock().await;
        slots.get(&kind).and_then(|cell| cell.get().cloned())
    }
}

async fn find_or_create(
    api: &dyn AssistantsApi,
    profile: &AssistantProfile,
    model_deployment: &str,
) -> Result<AssistantHandle> {
    let existing = api
        .list_assistants()
        .await?
        .into_iter()
        .find(|a| a.name.as_deref() == Some(profile.name));

    let assistant = match existing {
        Some(a) => {
            tracing::debug!(name = profile.name, id = %a.id, "assistant already exists");
            a
        }
        None => {
            let request = CreateAssistantRequest {
                name: profile.name.to_string(),
                instructions: profile.instructions.to_string(),
                tools: profile.tools.clone(),
                model: model_deployment.to_string(),
            };
            let a = api.create_assistant(&request).await?;
            tracing::info!(name = profile.name, id = %a.id, "assistant created");
            a
        }
    };

    Ok(AssistantHandle {
        id: assistant.id,
        name: profile.name.to_string(),
    })
}
