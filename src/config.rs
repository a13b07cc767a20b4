use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// 登录方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// 优先浏览器，浏览器不可用时退回 HTTP
    Auto,
    /// 只用浏览器自动化
    Browser,
    /// 只用手工 HTTP 请求
    Http,
}

impl AuthMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(AuthMode::Auto),
            "browser" => Some(AuthMode::Browser),
            "http" => Some(AuthMode::Http),
            _ => None,
        }
    }
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Rest,
}

impl StoreKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StoreKind::Memory),
            "rest" => Some(StoreKind::Rest),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 站点 ---
    /// 站点根地址
    pub archive_base_url: String,
    /// 浏览器与 HTTP 客户端使用的 UA
    pub user_agent: String,

    // --- 登录 ---
    pub auth_mode: AuthMode,
    /// 浏览器可执行文件路径（为空时自动探测）
    pub browser_executable: Option<String>,
    /// 已启动浏览器的调试端口（设置后直接连接，不再启动新浏览器）
    pub browser_debug_port: Option<u16>,
    /// 等待登录跳转的超时（秒）
    pub login_timeout_secs: u64,
    /// 单次页面加载的超时（秒）
    pub navigation_timeout_secs: u64,
    /// 提交前随机等待区间（毫秒）
    pub submit_jitter_ms: (u64, u64),
    /// 登录结果不明确时的最大尝试次数
    pub login_max_attempts: usize,

    // --- 抓取 ---
    /// 每个列表页最多翻几页
    pub max_scrape_pages: usize,
    /// 公共列表兜底时最多取几部作品
    pub public_fallback_limit: usize,
    /// 是否允许使用内置示例数据兜底
    pub allow_sample_fallback: bool,
    /// 兜底数据是否写入书库
    pub persist_fallback_data: bool,

    // --- 写入 ---
    /// 每批写入条数
    pub batch_size: usize,
    /// 同时写入的批次数
    pub max_concurrent_batches: usize,
    pub store_kind: StoreKind,
    pub store_url: String,
    pub store_api_key: String,
    pub store_table: String,

    // --- 会话 ---
    /// 本地会话有效期（秒）
    pub session_ttl_secs: u64,

    // --- 导入请求 ---
    /// 书库所有者 ID
    pub owner_id: String,
    /// 站点账号
    pub identity: Option<String>,
    /// 站点密码
    pub secret: Option<String>,
    /// 书签导出 HTML 路径
    pub bookmarks_file: Option<String>,
    /// 阅读历史导出 JSON 路径
    pub history_file: Option<String>,
    /// 稍后阅读导出 JSON 路径
    pub marked_for_later_file: Option<String>,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_base_url: "https://archiveofourown.org".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            auth_mode: AuthMode::Auto,
            browser_executable: None,
            browser_debug_port: None,
            login_timeout_secs: 45,
            navigation_timeout_secs: 30,
            submit_jitter_ms: (300, 1200),
            login_max_attempts: 2,
            max_scrape_pages: 3,
            public_fallback_limit: 5,
            allow_sample_fallback: false,
            persist_fallback_data: false,
            batch_size: 50,
            max_concurrent_batches: 2,
            store_kind: StoreKind::Memory,
            store_url: String::new(),
            store_api_key: String::new(),
            store_table: "user_library".to_string(),
            session_ttl_secs: 60 * 60 * 24 * 7,
            owner_id: "local".to_string(),
            identity: None,
            secret: None,
            bookmarks_file: None,
            history_file: None,
            marked_for_later_file: None,
            verbose_logging: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("archive_base_url", &self.archive_base_url)
            .field("auth_mode", &self.auth_mode)
            .field("browser_executable", &self.browser_executable)
            .field("browser_debug_port", &self.browser_debug_port)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("store_kind", &self.store_kind)
            .field("store_url", &self.store_url)
            .field("owner_id", &self.owner_id)
            .field("identity", &self.identity)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("bookmarks_file", &self.bookmarks_file)
            .field("history_file", &self.history_file)
            .field("marked_for_later_file", &self.marked_for_later_file)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// 默认值 → 可选 TOML 文件（`AO3_SYNC_CONFIG`）→ 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("AO3_SYNC_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(&path))?.with_env_overrides(),
            _ => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 只读取环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            archive_base_url: env_string("ARCHIVE_BASE_URL").unwrap_or(d.archive_base_url),
            user_agent: env_string("USER_AGENT").unwrap_or(d.user_agent),
            auth_mode: env_string("AUTH_MODE").and_then(|v| AuthMode::parse(&v)).unwrap_or(d.auth_mode),
            browser_executable: env_string("BROWSER_EXECUTABLE").or(d.browser_executable),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(d.browser_debug_port),
            login_timeout_secs: env_parse("LOGIN_TIMEOUT_SECS").unwrap_or(d.login_timeout_secs),
            navigation_timeout_secs: env_parse("NAVIGATION_TIMEOUT_SECS").unwrap_or(d.navigation_timeout_secs),
            submit_jitter_ms: d.submit_jitter_ms,
            login_max_attempts: env_parse("LOGIN_MAX_ATTEMPTS").unwrap_or(d.login_max_attempts),
            max_scrape_pages: env_parse("MAX_SCRAPE_PAGES").unwrap_or(d.max_scrape_pages),
            public_fallback_limit: env_parse("PUBLIC_FALLBACK_LIMIT").unwrap_or(d.public_fallback_limit),
            allow_sample_fallback: env_parse("ALLOW_SAMPLE_FALLBACK").unwrap_or(d.allow_sample_fallback),
            persist_fallback_data: env_parse("PERSIST_FALLBACK_DATA").unwrap_or(d.persist_fallback_data),
            batch_size: env_parse("BATCH_SIZE").unwrap_or(d.batch_size),
            max_concurrent_batches: env_parse("MAX_CONCURRENT_BATCHES").unwrap_or(d.max_concurrent_batches),
            store_kind: env_string("STORE_KIND").and_then(|v| StoreKind::parse(&v)).unwrap_or(d.store_kind),
            store_url: env_string("STORE_URL").unwrap_or(d.store_url),
            store_api_key: env_string("STORE_API_KEY").unwrap_or(d.store_api_key),
            store_table: env_string("STORE_TABLE").unwrap_or(d.store_table),
            session_ttl_secs: env_parse("SESSION_TTL_SECS").unwrap_or(d.session_ttl_secs),
            owner_id: env_string("OWNER_ID").unwrap_or(d.owner_id),
            identity: env_string("AO3_USERNAME").or(d.identity),
            secret: env_string("AO3_PASSWORD").or(d.secret),
            bookmarks_file: env_string("BOOKMARKS_FILE").or(d.bookmarks_file),
            history_file: env_string("HISTORY_FILE").or(d.history_file),
            marked_for_later_file: env_string("MARKED_FOR_LATER_FILE").or(d.marked_for_later_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(d.verbose_logging),
        }
    }

    /// 检查组合后才能判断的必填项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_kind == StoreKind::Rest && self.store_url.trim().is_empty() {
            return Err(ConfigError::Missing("STORE_URL".to_string()));
        }
        Ok(())
    }

    /// 站点内路径转为完整 URL
    pub fn archive_url(&self, path: &str) -> String {
        format!("{}{}", self.archive_base_url.trim_end_matches('/'), path)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.trim().parse().ok())
}
