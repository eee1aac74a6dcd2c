//! search_google 工具：Google Programmable Search
//!
//! GET 请求带 key / cx / q 参数与超时；只保留结果 items 中的 title、link、snippet。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SearchSection;
use crate::core::{RelayError, Result};

/// 精简后的单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// 无结果时 API 不返回 items
    #[serde(default)]
    items: Vec<SearchItem>,
}

/// Web 搜索后端
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchItem>>;
}

pub struct GoogleSearchTool {
    client: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

impl GoogleSearchTool {
    pub fn new(endpoint: &str, api_key: &str, engine_id: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
        })
    }

    /// 从 [search] 段构建；key 或 engine id 缺失时报配置错误
    pub fn from_config(cfg: &SearchSection) -> Result<Self> {
        let api_key = cfg
            .api_key
            .as_deref()
            .ok_or_else(|| RelayError::Config("search.api_key is not set".to_string()))?;
        let engine_id = cfg
            .engine_id
            .as_deref()
            .ok_or_else(|| RelayError::Config("search.engine_id is not set".to_string()))?;
        Self::new(&cfg.endpoint, api_key, engine_id, cfg.timeout_secs)
    }
}

/// 未配置搜索凭据时的占位后端：每次调用都返回配置错误
pub struct UnconfiguredSearch;

#[async_trait]
impl WebSearch for UnconfiguredSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchItem>> {
        Err(RelayError::Config(
            "search_google requires search.api_key and search.engine_id".to_string(),
        ))
    }
}

/// 解析搜索 API 响应体，取出精简结果列表
pub fn parse_items(body: &str) -> Result<Vec<SearchItem>> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    Ok(resp.items)
}

#[async_trait]
impl WebSearch for GoogleSearchTool {
    async fn search(&self, query: &str) -> Result<Vec<SearchItem>> {
        tracing::info!(query = %query, "search_google");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RelayError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        parse_items(&body)
    }
}
