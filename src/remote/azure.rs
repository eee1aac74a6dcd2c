//! Azure OpenAI assistants REST 客户端
//!
//! 通过 reqwest 调用 `{endpoint}/openai/...?api-version=...`，以 `api-key` 头鉴权；
//! 非 2xx 响应转为 RelayError::Remote（带状态码与响应体）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::AzureSection;
use crate::core::{RelayError, Result};
use crate::remote::types::{
    CreateMessageRequest, CreateRunRequest, ImageGenerationRequest, ListResponse,
};
use crate::remote::{
    Assistant, AssistantsApi, CreateAssistantRequest, ImageGeneration, Run, Thread,
    ThreadMessage, ToolOutput,
};

/// Azure OpenAI 客户端：持有 reqwest Client、端点、密钥与 API 版本
pub struct AzureAssistantsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    image_deployment: String,
}

impl AzureAssistantsClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        api_version: &str,
        image_deployment: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
            image_deployment: image_deployment.to_string(),
        })
    }

    /// 从 [azure] 段构建；端点与密钥缺失时报配置错误
    pub fn from_config(cfg: &AzureSection) -> Result<Self> {
        let endpoint = cfg
            .endpoint
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Config("azure.endpoint is not set".to_string()))?;
        let api_key = cfg
            .api_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Config("azure.api_key is not set".to_string()))?;
        Self::new(
            endpoint,
            api_key,
            &cfg.api_version,
            &cfg.image_deployment,
            cfg.timeout_secs,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/openai/{}", self.endpoint, path)
    }

    /// 附加鉴权与版本参数后发送；非 2xx 读出响应体作为错误信息
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = self.execute(request).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl AssistantsApi for AzureAssistantsClient {
    /// 按 after 游标翻页，直到 has_more 为 false
    async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        let mut assistants = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.url("assistants"))
                .query(&[("limit", "100"), ("order", "desc")]);
            if let Some(cursor) = after.as_deref() {
                request = request.query(&[("after", cursor)]);
            }
            let page: ListResponse<Assistant> = self.send_json(request).await?;
            let next = page.next_cursor().map(str::to_string);
            assistants.extend(page.data);
            match next {
                Some(cursor) if after.as_deref() != Some(cursor.as_str()) => after = Some(cursor),
                _ => break,
            }
        }
        Ok(assistants)
    }

    async fn create_assistant(&self, request: &CreateAssistantRequest) -> Result<Assistant> {
        let request = self.client.post(self.url("assistants")).json(request);
        self.send_json(request).await
    }

    async fn create_thread(&self) -> Result<Thread> {
        let request = self
            .client
            .post(self.url("threads"))
            .json(&serde_json::json!({}));
        self.send_json(request).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let request = self.client.delete(self.url(&format!("threads/{thread_id}")));
        self.execute(request).await?;
        Ok(())
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let body = CreateMessageRequest {
            role: "user".to_string(),
            content: content.to_string(),
        };
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/messages")))
            .json(&body);
        self.send_json(request).await
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run> {
        let body = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
            instructions: instructions.map(String::from),
        };
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs")))
            .json(&body);
        self.send_json(request).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let request = self
            .client
            .get(self.url(&format!("threads/{thread_id}/runs/{run_id}")));
        self.send_json(request).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let request = self
            .client
            .post(self.url(&format!(
                "threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
            )))
            .json(&serde_json::json!({ "tool_outputs": outputs }));
        self.send_json(request).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let request = self
            .client
            .get(self.url(&format!("threads/{thread_id}/messages")))
            .query(&[("order", "desc")]);
        let list: ListResponse<ThreadMessage> = self.send_json(request).await?;
        Ok(list.data)
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let request = self
            .client
            .get(self.url(&format!("files/{file_id}/content")));
        let resp = self.execute(request).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageGeneration> {
        let body = ImageGenerationRequest {
            prompt: prompt.to_string(),
            n: 1,
        };
        let request = self
            .client
            .post(self.url(&format!(
                "deployments/{}/images/generations",
                self.image_deployment
            )))
            .json(&body);
        self.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = AzureAssistantsClient::new(
            "https://example.openai.azure.com/",
            "key",
            "2024-05-01-preview",
            "Dalle3",
            5,
        )
        .unwrap();
        assert_eq!(
            client.url("threads/t1/runs"),
            "https://example.openai.azure.com/openai/threads/t1/runs"
        );
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let cfg = AzureSection::default();
        match AzureAssistantsClient::from_config(&cfg) {
            Err(RelayError::Config(msg)) => assert!(msg.contains("endpoint")),
            _ => panic!("Expected Config error"),
        }
    }

    async fn serve_assistant_pages() -> String {
        use axum::extract::Query;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::get;
        use axum::{Json, Router};
        use std::collections::HashMap;

        async fn assistants(
            headers: HeaderMap,
            Query(q): Query<HashMap<String, String>>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some("key") {
                return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
            }
            let page = match q.get("after").map(String::as_str) {
                None => serde_json::json!({
                    "data": [{ "id": "asst_1", "name": "Other" }],
                    "has_more": true,
                    "last_id": "asst_1"
                }),
                Some("asst_1") => serde_json::json!({
                    "data": [{ "id": "asst_2", "name": "Math Tutor" }],
                    "has_more": false,
                    "last_id": "asst_2"
                }),
                Some(_) => serde_json::json!({ "data": [] }),
            };
            (StatusCode::OK, Json(page))
        }

        let app = Router::new().route("/openai/assistants", get(assistants));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_list_assistants_walks_every_page() {
        let endpoint = serve_assistant_pages().await;
        let client =
            AzureAssistantsClient::new(&endpoint, "key", "2024-05-01-preview", "Dalle3", 5).unwrap();

        let assistants = client.list_assistants().await.unwrap();
        let names: Vec<_> = assistants.iter().filter_map(|a| a.name.as_deref()).collect();
        assert_eq!(names, vec!["Other", "Math Tutor"]);
    }

    #[tokio::test]
    async fn test_remote_error_carries_status() {
        let endpoint = serve_assistant_pages().await;
        let client =
            AzureAssistantsClient::new(&endpoint, "wrong", "2024-05-01-preview", "Dalle3", 5).unwrap();

        match client.list_assistants().await {
            Err(RelayError::Remote { status, .. }) => assert_eq!(status, 401),
            other => panic!("Expected Remote error, got {:?}", other.map(|v| v.len())),
        }
    }
}
