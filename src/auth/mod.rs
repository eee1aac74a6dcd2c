//! 身份：反向代理注入的身份头解析与登出地址

pub mod identity;

pub use identity::{logout_url, resolve_identity, sample_user, UserIdentity};
