//! 手工维护 Cookie 的 HTTP 会话 - 基础设施层
//!
//! 不使用 reqwest 的自动跳转和 Cookie 存储：每个响应的 `Set-Cookie`
//! 都由这里解析并在下一次请求中带上，跳转也逐跳手工跟随，
//! 这样登录流程能在每一跳上看到 Cookie 的变化。

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client, RequestBuilder, Response};
use tracing::debug;

use crate::config::Config;
use crate::error::AuthError;

/// 最多跟随的跳转次数
const MAX_REDIRECTS: usize = 8;

/// 一次请求的最终结果
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// 跟随跳转后的最终地址
    pub final_url: String,
    /// HTTP 状态码（浏览器抓取时未知）
    pub status: Option<u16>,
    pub html: String,
}

/// HTTP 会话
pub struct HttpSession {
    client: Client,
    base_url: String,
    timeout_secs: u64,
    cookies: Mutex<BTreeMap<String, String>>,
}

impl HttpSession {
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.navigation_timeout_secs))
            .build()
            .map_err(|e| AuthError::Network(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.archive_base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.navigation_timeout_secs,
            cookies: Mutex::new(BTreeMap::new()),
        })
    }

    /// GET 并手工跟随跳转
    pub async fn get(&self, url: &str) -> Result<FetchedPage, AuthError> {
        let request = self.client.get(self.absolute(url));
        self.send_following(request, url).await
    }

    /// 提交表单（`application/x-www-form-urlencoded`）并手工跟随跳转
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<FetchedPage, AuthError> {
        let request = self.client.post(self.absolute(url)).form(form);
        self.send_following(request, url).await
    }

    /// 当前持有的某个 Cookie 值
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .ok()
            .and_then(|jar| jar.get(name).cloned())
    }

    pub fn clear_cookies(&self) {
        if let Ok(mut jar) = self.cookies.lock() {
            jar.clear();
        }
    }

    async fn send_following(&self, first: RequestBuilder, url: &str) -> Result<FetchedPage, AuthError> {
        let mut current_url = self.absolute(url);
        let mut response = self.send(first).await?;

        for _ in 0..MAX_REDIRECTS {
            if !response.status().is_redirection() {
                break;
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                break;
            };

            current_url = self.absolute(&location);
            debug!("跟随跳转 → {}", current_url);
            response = self.send(self.client.get(&current_url)).await?;
        }

        let status = response.status().as_u16();
        let html = response.text().await.map_err(|e| self.map_error(e))?;
        Ok(FetchedPage {
            final_url: current_url,
            status: Some(status),
            html,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        let request = match self.cookie_header() {
            Some(header) => request.header(COOKIE, header),
            None => request,
        };
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        self.store_cookies(&response);
        Ok(response)
    }

    fn map_error(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::AmbiguousTimeout(self.timeout_secs)
        } else {
            AuthError::from(err)
        }
    }

    fn store_cookies(&self, response: &Response) {
        let Ok(mut jar) = self.cookies.lock() else {
            return;
        };
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            match parse_set_cookie(raw) {
                Some((name, Some(value))) => {
                    jar.insert(name, value);
                }
                Some((name, None)) => {
                    jar.remove(&name);
                }
                None => {}
            }
        }
    }

    fn cookie_header(&self) -> Option<String> {
        let jar = self.cookies.lock().ok()?;
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }
}

/// 解析一条 `Set-Cookie`
///
/// # 返回
/// - `Some((name, Some(value)))`: 设置 Cookie
/// - `Some((name, None))`: 删除 Cookie（值为空或已过期）
/// - `None`: 无法解析
pub(crate) fn parse_set_cookie(raw: &str) -> Option<(String, Option<String>)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let expired = parts.any(|attr| {
        let attr = attr.trim().to_ascii_lowercase();
        attr == "max-age=0" || attr.starts_with("expires=thu, 01 jan 1970")
    });

    if value.is_empty() || expired {
        Some((name.to_string(), None))
    } else {
        Some((name.to_string(), Some(value.to_string())))
    }
}
