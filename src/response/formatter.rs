//! 响应格式化
//!
//! 线程路径：取最新的 assistant 消息，文本片段直接拼接，图片片段下载后落盘并内联为 <img>。
//! 生图路径：一次性生图结果直接拼成同样的响应信封，不落盘。

use serde_json::Value;

use crate::core::{RelayError, Result};
use crate::message::ChatResponse;
use crate::remote::{AssistantsApi, ImageGeneration, MessageContent};
use crate::response::ImageStore;

/// 内联图片标记
pub fn image_markup(src: &str) -> String {
    format!(
        "<img src=\"{src}\" alt=\"Generated image\" width=\"100%\" height=\"auto\" display=\"block\" />"
    )
}

/// 读取线程里最新的 assistant 回复并构造响应信封
pub async fn format_thread_reply(
    api: &dyn AssistantsApi,
    thread_id: &str,
    history_metadata: Value,
    images: &ImageStore,
    model_label: &str,
) -> Result<ChatResponse> {
    let messages = api.list_messages(thread_id).await?;
    let message = messages
        .into_iter()
        .find(|m| m.role == "assistant")
        .ok_or_else(|| RelayError::NoReply(thread_id.to_string()))?;

    let mut content = String::new();
    for item in &message.content {
        match item {
            MessageContent::Text { text } => content.push_str(&text.value),
            MessageContent::ImageFile { image_file } => {
                let bytes = api.file_content(&image_file.file_id).await?;
                images.save(thread_id, &bytes).await?;
                content.push_str(&image_markup(&ImageStore::public_path(thread_id)));
            }
            MessageContent::Other => {
                tracing::debug!(message_id = %message.id, "skipping unsupported content segment");
            }
        }
    }
    tracing::debug!(thread_id, "assistant: {}", content);

    Ok(ChatResponse::single(
        message.id,
        model_label,
        message.created_at,
        Some(message.object),
        content,
        history_metadata,
    ))
}

/// 一次性生图结果 -> 响应信封（id 为新生成的 UUID）
pub fn format_image_generation(
    generation: &ImageGeneration,
    history_metadata: Value,
    model_label: &str,
) -> Result<ChatResponse> {
    let url = generation
        .data
        .first()
        .and_then(|img| img.url.as_deref())
        .ok_or(RelayError::NoImage)?;

    let mut content = String::from("Here is an image generated from your prompt:");
    content.push_str(&image_markup(url));

    Ok(ChatResponse::single(
        uuid::Uuid::new_v4().to_string(),
        model_label,
        generation.created,
        None,
        content,
        history_metadata,
    ))
}
