//! 手工 HTTP 登录
//!
//! 三次请求：首页 → 登录页 → 提交表单。Cookie 和防伪令牌都由本模块手工传递，
//! 结果判定与浏览器登录共用 `outcome::classify`。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info};

use super::outcome::{classify, LoginProbe, SESSION_COOKIE};
use super::{submit_jitter, ArchiveSession, Authenticator, PageFetcher};
use crate::config::Config;
use crate::error::AuthError;
use crate::infrastructure::{FetchedPage, HttpSession};
use crate::models::AuthSession;

static TOKEN_INPUT: Lazy<Selector> = Lazy::new(|| parse(r#"input[name="authenticity_token"]"#));
static CSRF_META: Lazy<Selector> = Lazy::new(|| parse(r#"meta[name="csrf-token"]"#));
static LOGIN_INPUT: Lazy<Selector> =
    Lazy::new(|| parse(r#"#user_login, input[name="user[login]"]"#));

fn parse(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// 从登录页读取防伪令牌：优先表单隐藏字段，其次 `<meta name="csrf-token">`
pub(crate) fn extract_authenticity_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&TOKEN_INPUT)
        .find_map(|el| el.value().attr("value"))
        .or_else(|| document.select(&CSRF_META).find_map(|el| el.value().attr("content")))
        .map(str::to_string)
        .filter(|t| !t.is_empty())
}

fn has_login_form(html: &str) -> bool {
    Html::parse_document(html).select(&LOGIN_INPUT).next().is_some()
}

/// 手工 HTTP 登录
pub struct HttpAuthenticator {
    config: Config,
}

impl HttpAuthenticator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn login(&self, identity: &str, secret: &str) -> Result<ArchiveSession, AuthError> {
        let http = HttpSession::new(&self.config)?;

        debug!("请求首页以获取初始 Cookie");
        http.get(&self.config.archive_url("/")).await?;

        let login_page = http.get(&self.config.archive_url("/users/login")).await?;
        if !has_login_form(&login_page.html) {
            return Err(AuthError::LoginFormNotFound);
        }
        let token = extract_authenticity_token(&login_page.html);
        if token.is_none() {
            debug!("登录页没有防伪令牌，直接提交");
        }

        tokio::time::sleep(submit_jitter(self.config.submit_jitter_ms)).await;

        let mut form = vec![
            ("user[login]", identity),
            ("user[password]", secret),
            ("user[remember_me]", "1"),
            ("commit", "Log In"),
        ];
        if let Some(token) = token.as_deref() {
            form.push(("authenticity_token", token));
        }

        let result = http.post_form(&self.config.archive_url("/users/login"), &form).await?;
        let probe = LoginProbe::from_page(&result.final_url, &result.html, http.cookie(SESSION_COOKIE));
        let token = classify(&probe, identity)?;

        info!("✅ HTTP 登录成功: {}", identity);
        Ok(ArchiveSession::new(
            AuthSession::new(identity, token),
            Box::new(http),
            self.config.archive_url("/users/logout"),
        ))
    }
}

#[async_trait]
impl PageFetcher for HttpSession {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError> {
        self.get(url).await
    }

    async fn submit_form(&self, url: &str, form: &[(&str, &str)]) -> Result<FetchedPage, AuthError> {
        self.post_form(url, form).await
    }

    async fn release(&mut self) {
        self.clear_cookies();
    }
}

/// 不登录的公共抓取
pub fn anonymous_fetcher(config: &Config) -> Result<HttpSession, AuthError> {
    HttpSession::new(config)
}
