//! 调用方身份解析
//!
//! 身份由前置反向代理（App Service EasyAuth）注入的请求头提供。
//! 没有 Principal-Id 头时视为本地开发，返回固定的示例用户；
//! 有 Principal-Id 但缺少其余必需头时报错，由 HTTP 层转为登出重定向。

use axum::http::HeaderMap;
use serde::Serialize;

use crate::core::IdentityError;

pub const PRINCIPAL_ID: &str = "x-ms-client-principal-id";
pub const PRINCIPAL_NAME: &str = "x-ms-client-principal-name";
pub const PRINCIPAL_IDP: &str = "x-ms-client-principal-idp";
pub const AAD_ID_TOKEN: &str = "x-ms-token-aad-id-token";
pub const CLIENT_PRINCIPAL: &str = "x-ms-client-principal";

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub user_principal_id: String,
    pub user_name: String,
    pub auth_provider: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    /// base64 编码的 principal，原样保留
    #[serde(skip_serializing)]
    pub client_principal_b64: String,
    #[serde(skip_serializing)]
    pub aad_id_token: String,
}

/// 本地开发时使用的固定身份
pub fn sample_user() -> UserIdentity {
    UserIdentity {
        user_principal_id: "00000000-0000-0000-0000-000000000000".to_string(),
        user_name: "testusername@contoso.com".to_string(),
        auth_provider: "aad".to_string(),
        auth_token: "your_aad_id_token".to_string(),
        client_principal_b64: "your_base_64_encoded_token".to_string(),
        aad_id_token: "your_aad_id_token".to_string(),
    }
}

fn required(headers: &HeaderMap, name: &'static str) -> Result<String, IdentityError> {
    let value = headers
        .get(name)
        .ok_or(IdentityError::MissingHeader(name))?;
    value
        .to_str()
        .map(str::to_string)
        .map_err(|_| IdentityError::InvalidHeader(name))
}

/// 从请求头解析调用方身份
pub fn resolve_identity(headers: &HeaderMap) -> Result<UserIdentity, IdentityError> {
    if !headers.contains_key(PRINCIPAL_ID) {
        return Ok(sample_user());
    }

    let auth_token = required(headers, AAD_ID_TOKEN)?;
    Ok(UserIdentity {
        user_principal_id: required(headers, PRINCIPAL_ID)?,
        user_name: required(headers, PRINCIPAL_NAME)?,
        auth_provider: required(headers, PRINCIPAL_IDP)?,
        aad_id_token: auth_token.clone(),
        auth_token,
        client_principal_b64: required(headers, CLIENT_PRINCIPAL)?,
    })
}

/// Entra ID 登出地址，登出后回到 redirect_uri
pub fn logout_url(tenant_id: Option<&str>, redirect_uri: &str) -> String {
    format!(
        "https://login.microsoftonline.com/{}/oauth2/logout?post_logout_redirect_uri={}",
        tenant_id.unwrap_or("common"),
        redirect_uri
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn full_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(PRINCIPAL_ID, HeaderValue::from_static("8a7c-user"));
        h.insert(PRINCIPAL_NAME, HeaderValue::from_static("jane@contoso.com"));
        h.insert(PRINCIPAL_IDP, HeaderValue::from_static("aad"));
        h.insert(AAD_ID_TOKEN, HeaderValue::from_static("eyJ0eXAi"));
        h.insert(CLIENT_PRINCIPAL, HeaderValue::from_static("eyJhdXRoX3R5cCI6ImFhZCJ9"));
        h
    }

    #[test]
    fn test_missing_principal_falls_back_to_sample_user() {
        let identity = resolve_identity(&HeaderMap::new()).unwrap();
        assert_eq!(identity, sample_user());
        assert!(!identity.user_name.is_empty());
        assert!(!identity.client_principal_b64.is_empty());
    }

    #[test]
    fn test_full_headers() {
        let identity = resolve_identity(&full_headers()).unwrap();
        assert_eq!(identity.user_principal_id, "8a7c-user");
        assert_eq!(identity.user_name, "jane@contoso.com");
        assert_eq!(identity.auth_provider, "aad");
        assert_eq!(identity.auth_token, "eyJ0eXAi");
        assert_eq!(identity.aad_id_token, "eyJ0eXAi");
        assert_eq!(identity.client_principal_b64, "eyJhdXRoX3R5cCI6ImFhZCJ9");
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let mut h = HeaderMap::new();
        for (name, value) in full_headers().iter() {
            let upper = name.as_str().to_ascii_uppercase();
            h.insert(HeaderName::from_bytes(upper.as_bytes()).unwrap(), value.clone());
        }
        assert_eq!(resolve_identity(&h).unwrap().user_principal_id, "8a7c-user");
    }

    #[test]
    fn test_partial_headers_fail() {
        let mut h = full_headers();
        h.remove(PRINCIPAL_NAME);
        assert_eq!(
            resolve_identity(&h),
            Err(IdentityError::MissingHeader(PRINCIPAL_NAME))
        );
    }

    #[test]
    fn test_non_utf8_header_is_invalid() {
        let mut h = full_headers();
        h.insert(PRINCIPAL_NAME, HeaderValue::from_bytes(b"J\xf6rg").unwrap());
        assert_eq!(
            resolve_identity(&h),
            Err(IdentityError::InvalidHeader(PRINCIPAL_NAME))
        );
    }

    #[test]
    fn test_logout_url() {
        assert_eq!(
            logout_url(Some("tenant-1"), "https://app.example.com/"),
            "https://login.microsoftonline.com/tenant-1/oauth2/logout?post_logout_redirect_uri=https://app.example.com/"
        );
    }
}
