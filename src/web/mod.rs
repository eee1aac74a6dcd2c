//! HTTP 接口
//!
//! - POST /conversation/:kind 与 POST /conversation?assistant_type=...（缺省 math）
//! - DELETE /conversation/:kind 丢弃调用方在该类型下的会话
//! - GET /images/:file 提供落盘的生成图片
//! - GET /api/me、GET /logout、GET /health
//!
//! 失败统一返回 `{"error": "..."}`；身份头不完整时重定向到登出地址。

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::agent::ConversationService;
use crate::assistants::AssistantKind;
use crate::auth::{logout_url, resolve_identity, UserIdentity};
use crate::config::AppConfig;
use crate::core::{RelayError, ShutdownManager};
use crate::message::TurnRequest;

/// 登出相关设置
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub tenant_id: Option<String>,
    /// 登出后回跳的地址
    pub redirect_uri: String,
}

impl AuthSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let redirect_uri = cfg
            .server
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/", base.trim_end_matches('/')))
            .unwrap_or_else(|| "/".to_string());
        Self {
            tenant_id: cfg.auth.tenant_id.clone(),
            redirect_uri,
        }
    }

    pub fn logout_url(&self) -> String {
        logout_url(self.tenant_id.as_deref(), &self.redirect_uri)
    }
}

/// HTTP 服务状态
pub struct AppState {
    pub service: Arc<ConversationService>,
    pub auth: AuthSettings,
    /// 每个请求的轮询使用它派生的请求令牌
    pub shutdown: Arc<ShutdownManager>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub assistant_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ResetBody {
    reset: bool,
}

/// 接口错误：映射为状态码与错误信封
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    /// 身份头不完整，重定向到该地址
    Logout(String),
    Internal(RelayError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
            }
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Logout(url) => {
                (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
            }
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// 创建路由
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/conversation", post(conversation_by_query))
        .route(
            "/conversation/:kind",
            post(conversation_by_path).delete(conversation_reset),
        )
        .route("/images/:file", get(serve_image))
        .route("/api/me", get(current_user))
        .route("/logout", get(logout))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

fn identify(state: &AppState, headers: &HeaderMap) -> Result<UserIdentity, ApiError> {
    resolve_identity(headers).map_err(|e| {
        tracing::debug!("Error getting user details: {}", e);
        ApiError::Logout(state.auth.logout_url())
    })
}

fn parse_kind(kind: &str) -> Result<AssistantKind, ApiError> {
    kind.parse()
        .map_err(|e: RelayError| ApiError::BadRequest(e.to_string()))
}

async fn run_conversation(
    state: &AppState,
    kind: &str,
    headers: &HeaderMap,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(kind)?;
    let user = identify(state, headers)?;
    let Json(request) = body?;
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest(RelayError::EmptyConversation.to_string()));
    }

    let cancel = state.shutdown.request_token();
    match state.service.converse(&user, kind, request, &cancel).await {
        Ok(resp) => Ok((StatusCode::OK, Json(resp)).into_response()),
        Err(e) => {
            tracing::error!(user_id = %user.user_principal_id, %kind, "An error occurred: {}", e);
            Err(ApiError::Internal(e))
        }
    }
}

/// POST /conversation/:kind
async fn conversation_by_path(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    run_conversation(&state, &kind, &headers, body).await
}

/// POST /conversation?assistant_type=web
async fn conversation_by_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConversationQuery>,
    headers: HeaderMap,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let kind = query.assistant_type.unwrap_or_else(|| "math".to_string());
    run_conversation(&state, &kind, &headers, body).await
}

/// DELETE /conversation/:kind
async fn conversation_reset(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ResetBody>, ApiError> {
    let kind = parse_kind(&kind)?;
    let user = identify(&state, &headers)?;
    let reset = state
        .service
        .reset(&user, kind)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(ResetBody { reset }))
}

/// GET /images/:file
async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state
        .service
        .images()
        .read(&file)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

/// GET /api/me：不含令牌的身份信息
async fn current_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserIdentity>, ApiError> {
    identify(&state, &headers).map(Json)
}

/// GET /logout
async fn logout(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.auth.logout_url())
}
