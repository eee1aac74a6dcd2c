//! 会话存储：(用户, 助手类型) -> 远端线程句柄
//!
//! 每个键一把异步锁，同一键上的查找/重置串行执行；不同助手类型互不覆盖。
//! 重置时先删除旧的远端线程，再创建新线程整体替换。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::assistants::AssistantKind;
use crate::core::Result;
use crate::remote::AssistantsApi;

/// 远端线程句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHandle {
    pub thread_id: String,
}

/// 何时丢弃已有线程、开始新会话
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// 请求里带了多于一条消息（客户端重发了整段历史）
    #[default]
    MultiMessage,
    /// 请求里只有一条消息（客户端开始了新对话）
    SingleMessage,
    Never,
}

impl ResetPolicy {
    pub fn should_reset(&self, message_count: usize) -> bool {
        match self {
            ResetPolicy::MultiMessage => message_count > 1,
            ResetPolicy::SingleMessage => message_count == 1,
            ResetPolicy::Never => false,
        }
    }
}

type ConversationKey = (String, AssistantKind);
type Slot = Arc<Mutex<Option<ConversationHandle>>>;

pub struct ConversationStore {
    policy: ResetPolicy,
    slots: Mutex<HashMap<ConversationKey, Slot>>,
}

impl ConversationStore {
    pub fn new(policy: ResetPolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    async fn slot(&self, user_id: &str, kind: AssistantKind) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry((user_id.to_string(), kind))
            .or_default()
            .clone()
    }

    /// 返回已有线程；不存在时创建，策略触发时删除旧线程并替换
    pub async fn get_or_reset(
        &self,
        api: &dyn AssistantsApi,
        user_id: &str,
        kind: AssistantKind,
        message_count: usize,
    ) -> Result<ConversationHandle> {
        let slot = self.slot(user_id, kind).await;
        let mut entry = slot.lock().await;

        if let Some(handle) = entry.as_ref() {
            if !self.policy.should_reset(message_count) {
                return Ok(handle.clone());
            }
            delete_remote_thread(api, &handle.thread_id).await?;
            tracing::debug!(user_id, %kind, thread_id = %handle.thread_id, "deleted the old thread");
            *entry = None;
        } else {
            tracing::debug!(user_id, %kind, "no existing thread");
        }

        let thread = api.create_thread().await?;
        let handle = ConversationHandle {
            thread_id: thread.id,
        };
        tracing::debug!(user_id, %kind, thread_id = %handle.thread_id, "thread created");
        *entry = Some(handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, user_id: &str, kind: AssistantKind) -> Option<ConversationHandle> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(&(user_id.to_string(), kind)).cloned()
        }?;
        let entry = slot.lock().await;
        entry.clone()
    }

    /// 删除远端线程并移除记录；返回是否存在过
    pub async fn discard(
        &self,
        api: &dyn AssistantsApi,
        user_id: &str,
        kind: AssistantKind,
    ) -> Result<bool> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(&(user_id.to_string(), kind)).cloned()
        };
        let Some(slot) = slot else {
            return Ok(false);
        };
        let mut entry = slot.lock().await;
        match entry.take() {
            Some(handle) => {
                if let Err(e) = delete_remote_thread(api, &handle.thread_id).await {
                    *entry = Some(handle);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 当前在册的线程数
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut n = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                n += 1;
            }
        }
        n
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 进程退出时调用：删除所有在册的远端线程（失败只记日志），返回成功删除的数量
    pub async fn shutdown(&self, api: &dyn AssistantsApi) -> usize {
        let slots: Vec<(ConversationKey, Slot)> = self.slots.lock().await.drain().collect();
        let mut deleted = 0;
        for ((user_id, kind), slot) in slots {
            let Some(handle) = slot.lock().await.take() else {
                continue;
            };
            match delete_remote_thread(api, &handle.thread_id).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(
                    user_id = %user_id,
                    %kind,
                    thread_id = %handle.thread_id,
                    "failed to delete thread: {}",
                    e
                ),
            }
        }
        deleted
    }
}

/// 删除远端线程；远端已不存在（404）视为删除成功
async fn delete_remote_thread(api: &dyn AssistantsApi, thread_id: &str) -> Result<()> {
    match api.delete_thread(thread_id).await {
        Err(e) if e.is_not_found() => {
            tracing::debug!(thread_id, "thread already gone remotely");
            Ok(())
        }
        other => other,
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(ResetPolicy::default())
    }
}
