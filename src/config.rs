//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `THREADLINE__*` 覆盖（双下划线表示嵌套，如
//! `THREADLINE__POLL__MAX_STEPS=20`）。旧部署使用的扁平环境变量（`AZURE_OPENAI_ENDPOINT`、
//! `GOOGLE_SEARCH_API_KEY`、`AUTH_TENANT_ID`、`DEBUG` 等）最后叠加，优先级最高。

use std::path::PathBuf;

use serde::Deserialize;

use crate::conversation::ResetPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub azure: AzureSection,
    pub search: SearchSection,
    pub auth: AuthSection,
    pub poll: PollSection,
    pub conversation: ConversationSection,
    pub response: ResponseSection,
}

/// [app] 段：调试开关、生成图片的落盘目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 打开后默认日志级别为 debug
    pub debug: bool,
    pub images_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            debug: false,
            images_dir: PathBuf::from("images"),
        }
    }
}

/// [server] 段：监听地址；public_base_url 用于登出后的回跳地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub public_base_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: None,
        }
    }
}

/// [azure] 段：托管 assistants 服务的端点、密钥、部署名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AzureSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    /// 创建 assistant 时使用的模型部署名
    pub deployment: String,
    /// 一次性生图使用的部署名
    pub image_deployment: String,
    pub timeout_secs: u64,
}

impl Default for AzureSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2024-05-01-preview".to_string(),
            deployment: "gpt-35-turbo".to_string(),
            image_deployment: "Dalle3".to_string(),
            timeout_secs: 60,
        }
    }
}

/// [search] 段：Google Programmable Search
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    /// 单次工具调用超时（秒）
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            api_key: None,
            engine_id: None,
            timeout_secs: 15,
        }
    }
}

/// [auth] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthSection {
    pub tenant_id: Option<String>,
}

/// 轮询退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// [poll] 段：run 轮询步数上限与间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub max_steps: u32,
    pub interval_secs: u64,
    pub backoff: BackoffKind,
    /// 指数退避的间隔上限（秒）
    pub max_interval_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            max_steps: 10,
            interval_secs: 3,
            backoff: BackoffKind::Fixed,
            max_interval_secs: 30,
        }
    }
}

/// [conversation] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    pub reset_policy: ResetPolicy,
    /// 进程退出时删除仍在册的远端线程
    pub cleanup_on_shutdown: bool,
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            reset_policy: ResetPolicy::default(),
            cleanup_on_shutdown: true,
        }
    }
}

/// [response] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseSection {
    /// 响应信封里的固定 model 字段
    pub model_label: String,
}

impl Default for ResponseSection {
    fn default() -> Self {
        Self {
            model_label: "gpt-3.5-turbo".to_string(),
        }
    }
}

/// 旧部署的扁平环境变量 -> 配置键
const LEGACY_ENV: &[(&str, &str)] = &[
    ("AZURE_OPENAI_ENDPOINT", "azure.endpoint"),
    ("AZURE_OPENAI_KEY", "azure.api_key"),
    ("AZURE_OPENAI_MODEL", "azure.deployment"),
    ("AZURE_OPENAI_PREVIEW_API_VERSION", "azure.api_version"),
    ("AZURE_OPENAI_IMAGE_DEPLOYMENT", "azure.image_deployment"),
    ("GOOGLE_SEARCH_API_KEY", "search.api_key"),
    ("GOOGLE_SEARCH_ENGINE_ID", "search.engine_id"),
    ("AUTH_TENANT_ID", "auth.tenant_id"),
];

/// 从 config 目录加载配置，环境变量可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 THREADLINE__*（双下划线表示嵌套键）
/// 4. 最后叠加旧部署的扁平环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("THREADLINE")
            .separator("__")
            .try_parsing(true),
    );

    for (var, key) in LEGACY_ENV {
        builder = builder.set_override_option(*key, std::env::var(var).ok())?;
    }
    let debug = std::env::var("DEBUG")
        .ok()
        .map(|v| v.trim().eq_ignore_ascii_case("true"));
    builder = builder.set_override_option("app.debug", debug)?;
    let port = std::env::var("THREADLINE_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .map(i64::from);
    builder = builder.set_override_option("server.port", port)?;

    let c = builder.build()?;
    c.try_deserialize()
}
