//! 登录会话管理
//!
//! 两种登录方式（浏览器自动化、手工 HTTP）实现同一个 `Authenticator` 接口，
//! 由 `AuthSessionManager` 按运行环境的能力选择：`auto` 模式先试浏览器，
//! 浏览器不可用时退回 HTTP。

pub mod browser_login;
pub mod http_login;
pub mod outcome;
pub mod session_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{AuthMode, Config};
use crate::error::AuthError;
use crate::infrastructure::FetchedPage;
use crate::models::AuthSession;

pub use browser_login::BrowserAuthenticator;
pub use http_login::{anonymous_fetcher, HttpAuthenticator};
pub use outcome::{classify, is_login_url, LoginProbe, SESSION_COOKIE};
pub use session_store::{IdentityGuard, IdentityLocks, SessionRegistry};

/// 页面抓取能力：已登录的浏览器页面或 HTTP 会话
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError>;

    /// 以 `application/x-www-form-urlencoded` 提交表单，返回跳转后的页面
    async fn submit_form(&self, url: &str, _form: &[(&str, &str)]) -> Result<FetchedPage, AuthError> {
        Err(AuthError::SubmissionFailed(format!("不支持提交表单: {}", url)))
    }

    /// 释放底层资源（浏览器、Cookie），可重复调用
    async fn release(&mut self);
}

/// 登录方式
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &'static str;

    /// 登录并返回可用于抓取的会话
    async fn login(&self, identity: &str, secret: &str) -> Result<ArchiveSession, AuthError>;
}

/// 登录后的站点会话：凭据 + 持有的抓取资源
///
/// 必须调用 `close` 释放资源；成功和失败路径都一样
pub struct ArchiveSession {
    session: AuthSession,
    fetcher: Box<dyn PageFetcher>,
    logout_url: String,
}

impl ArchiveSession {
    pub fn new(session: AuthSession, fetcher: Box<dyn PageFetcher>, logout_url: String) -> Self {
        Self {
            session,
            fetcher,
            logout_url,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn identity(&self) -> &str {
        self.session.identity()
    }

    /// 用会话抓取一个页面
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError> {
        if !self.session.is_valid() {
            return Err(AuthError::SessionNotFound);
        }
        self.fetcher.fetch(url).await
    }

    /// 登出（尽力而为），会话随即失效
    ///
    /// 站点只接受带防伪令牌的 `DELETE /users/logout`（表单以 `_method=delete` 模拟），
    /// 所以先打开登出页取令牌再提交；拿不到令牌时只在本地作废会话，
    /// 服务端会话随后在 `close` 释放 Cookie 或浏览器时丢弃
    pub async fn logout(&mut self) {
        if !self.session.is_valid() {
            return;
        }
        match self.fetcher.fetch(&self.logout_url).await {
            Ok(page) => match http_login::extract_authenticity_token(&page.html) {
                Some(token) => {
                    let form = [("_method", "delete"), ("authenticity_token", token.as_str())];
                    match self.fetcher.submit_form(&self.logout_url, &form).await {
                        Ok(_) => debug!("已在站点登出: {}", self.session.identity()),
                        Err(e) => debug!("登出表单提交失败: {}", e),
                    }
                }
                None => debug!("登出页没有防伪令牌，只在本地作废会话"),
            },
            Err(e) => debug!("登出请求失败: {}", e),
        }
        self.session.invalidate();
    }

    /// 登出并释放底层资源
    pub async fn close(mut self) {
        self.logout().await;
        self.fetcher.release().await;
        debug!("会话资源已释放: {}", self.session.identity());
    }
}

impl std::fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// 提交前的随机等待
pub(crate) fn submit_jitter((low, high): (u64, u64)) -> Duration {
    if high <= low {
        return Duration::from_millis(low);
    }
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// 登录会话管理器
pub struct AuthSessionManager {
    authenticators: Vec<Arc<dyn Authenticator>>,
    max_attempts: usize,
}

impl AuthSessionManager {
    /// 按配置的登录方式创建
    pub fn new(config: &Config) -> Self {
        let browser: Arc<dyn Authenticator> = Arc::new(BrowserAuthenticator::new(config.clone()));
        let http: Arc<dyn Authenticator> = Arc::new(HttpAuthenticator::new(config.clone()));

        let authenticators = match config.auth_mode {
            AuthMode::Auto => vec![browser, http],
            AuthMode::Browser => vec![browser],
            AuthMode::Http => vec![http],
        };
        Self::with_authenticators(authenticators, config.login_max_attempts)
    }

    /// 使用指定的登录方式列表（按顺序尝试）
    pub fn with_authenticators(authenticators: Vec<Arc<dyn Authenticator>>, max_attempts: usize) -> Self {
        Self {
            authenticators,
            max_attempts: max_attempts.max(1),
        }
    }

    /// 获取一个已登录的站点会话
    ///
    /// # 参数
    /// - `identity`: 站点账号
    /// - `secret`: 密码
    ///
    /// # 返回
    /// - 登录方式报告 `BrowserUnavailable` 时换用下一种
    /// - 结果不明确（超时、网络错误）时同一方式最多重试 `max_attempts` 次
    /// - 其他错误直接返回
    pub async fn authenticate(&self, identity: &str, secret: &str) -> Result<ArchiveSession, AuthError> {
        if identity.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidCredentials("账号或密码为空".to_string()));
        }

        let mut last_error = AuthError::SessionNotFound;
        for authenticator in &self.authenticators {
            info!("🔐 使用 {} 方式登录: {}", authenticator.name(), identity);

            for attempt in 1..=self.max_attempts {
                match authenticator.login(identity, secret).await {
                    Ok(session) => return Ok(session),
                    Err(AuthError::BrowserUnavailable(reason)) => {
                        warn!("⚠️ {} 登录不可用: {}，尝试下一种方式", authenticator.name(), reason);
                        last_error = AuthError::BrowserUnavailable(reason);
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                        warn!("⚠️ 第 {}/{} 次登录结果不明确: {}，重试", attempt, self.max_attempts, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Err(last_error)
    }
}
