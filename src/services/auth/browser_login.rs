//! 浏览器自动化登录
//!
//! 填写表单后按顺序尝试多种提交方式，第一个执行成功的即为提交：
//! 1. 点击候选的提交按钮
//! 2. 在密码框中按回车
//! 3. 调用表单原生 `submit()`
//! 4. 逐个点击页面上的按钮，直到页面发生跳转

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, Element, Page};
use tracing::{debug, info, warn};

use super::outcome::{classify, LoginProbe, SESSION_COOKIE};
use super::{submit_jitter, ArchiveSession, Authenticator, PageFetcher};
use crate::browser::open_browser;
use crate::config::Config;
use crate::error::AuthError;
use crate::infrastructure::{FetchedPage, JsExecutor};
use crate::models::AuthSession;

const LOGIN_SELECTORS: &[&str] = &["#user_login", r#"input[name="user[login]"]"#, r#"input[type="text"]"#];
const PASSWORD_SELECTORS: &[&str] = &[
    "#user_password",
    r#"input[name="user[password]"]"#,
    r#"input[type="password"]"#,
];
const SUBMIT_SELECTORS: &[&str] = &[
    r#"input[name="commit"]"#,
    r#"input[type="submit"][value="Log In"]"#,
    r#"input[type="submit"]"#,
    r#"button[type="submit"]"#,
    r#"button[name="commit"]"#,
    r#"input[value*="Log"]"#,
    r#"input[value*="Sign"]"#,
    ".submit",
];

const CLEAR_INPUTS_JS: &str = r#"
(() => {
    document.querySelectorAll('input[type="text"], input[type="password"]').forEach(i => { i.value = ''; });
    return true;
})()
"#;

const NATIVE_SUBMIT_JS: &str = r#"
(() => {
    const form = Array.from(document.querySelectorAll('form')).find(f => f.querySelector('input[type="password"]'))
        || document.querySelector('form[action*="login"]')
        || document.querySelector('form');
    if (!form) return false;
    form.submit();
    return true;
})()
"#;

/// 浏览器自动化登录
pub struct BrowserAuthenticator {
    config: Config,
}

impl BrowserAuthenticator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.config.login_timeout_secs)
    }

    async fn fill_and_submit(&self, executor: &JsExecutor, identity: &str, secret: &str) -> Result<bool, AuthError> {
        let page = executor.page();
        let login_field = find_first(page, LOGIN_SELECTORS).await;
        let password_field = find_first(page, PASSWORD_SELECTORS).await;
        let (Some(login_field), Some(password_field)) = (login_field, password_field) else {
            return Err(AuthError::LoginFormNotFound);
        };

        if let Err(e) = executor.eval(CLEAR_INPUTS_JS).await {
            debug!("清空输入框失败: {}", e);
        }
        login_field.click().await?.type_str(identity).await?;
        password_field.click().await?.type_str(secret).await?;
        debug!("已填写登录表单");

        tokio::time::sleep(submit_jitter(self.config.submit_jitter_ms)).await;

        Ok(self.submit(executor, &password_field).await)
    }

    /// 按顺序尝试各种提交方式，返回是否有一种执行成功
    async fn submit(&self, executor: &JsExecutor, password_field: &Element) -> bool {
        let page = executor.page();

        for selector in SUBMIT_SELECTORS {
            if let Ok(button) = page.find_element(*selector).await {
                if button.click().await.is_ok() {
                    debug!("点击提交按钮: {}", selector);
                    return true;
                }
            }
        }

        if password_field.press_key("Enter").await.is_ok() {
            debug!("在密码框中按回车提交");
            return true;
        }

        if let Ok(value) = executor.eval(NATIVE_SUBMIT_JS).await {
            if value.as_bool() == Some(true) {
                debug!("调用表单 submit() 提交");
                return true;
            }
        }

        let before = executor.current_url().await.unwrap_or_default();
        if let Ok(buttons) = page.find_elements(r#"button, input[type="submit"]"#).await {
            for button in buttons {
                if button.click().await.is_err() {
                    continue;
                }
                if executor.wait_for_transition(Duration::from_secs(3)).await {
                    debug!("逐个点击按钮后页面发生跳转");
                    return true;
                }
                if executor.current_url().await.unwrap_or_default() != before {
                    return true;
                }
            }
        }

        false
    }

    async fn probe(&self, executor: &JsExecutor, timed_out: bool) -> Result<LoginProbe, AuthError> {
        let final_url = executor.current_url().await.map_err(submission_error)?;
        let html = executor.html().await.map_err(submission_error)?;
        let cookie = executor.cookie(SESSION_COOKIE).await.unwrap_or_else(|e| {
            debug!("读取 Cookie 失败: {}", e);
            None
        });
        Ok(LoginProbe::from_page(&final_url, &html, cookie).with_timeout(timed_out, self.config.login_timeout_secs))
    }

    async fn run_login(&self, executor: &JsExecutor, identity: &str, secret: &str) -> Result<AuthSession, AuthError> {
        let login_url = self.config.archive_url("/users/login");
        let loaded = executor
            .navigate(&login_url, self.login_timeout())
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if !loaded {
            warn!("⚠️ 登录页加载超时，继续尝试查找表单");
        }

        if !self.fill_and_submit(executor, identity, secret).await? {
            return Err(AuthError::SubmissionFailed("所有提交方式均未成功".to_string()));
        }

        let navigated = executor.wait_for_transition(self.login_timeout()).await;
        if !navigated {
            warn!("⚠️ 等待登录跳转超时 ({} 秒)", self.config.login_timeout_secs);
        }

        let probe = self.probe(executor, !navigated).await?;
        debug!("登录后页面: {}", probe.final_url);
        let token = classify(&probe, identity)?;
        Ok(AuthSession::new(identity, token))
    }
}

fn submission_error(err: anyhow::Error) -> AuthError {
    AuthError::SubmissionFailed(err.to_string())
}

async fn find_first(page: &Page, selectors: &[&str]) -> Option<Element> {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await {
            return Some(element);
        }
    }
    None
}

#[async_trait]
impl Authenticator for BrowserAuthenticator {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn login(&self, identity: &str, secret: &str) -> Result<ArchiveSession, AuthError> {
        let (browser, launched) = open_browser(&self.config)
            .await
            .map_err(|e| AuthError::BrowserUnavailable(e.to_string()))?;
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut fetcher = BrowserFetcher::without_page(browser, launched, &self.config);
                fetcher.release().await;
                return Err(AuthError::BrowserUnavailable(e.to_string()));
            }
        };

        let mut fetcher = BrowserFetcher::new(browser, launched, JsExecutor::new(page), &self.config);
        let result = match fetcher.executor.as_ref() {
            Some(executor) => self.run_login(executor, identity, secret).await,
            None => Err(AuthError::SessionNotFound),
        };

        match result {
            Ok(session) => {
                info!("✅ 浏览器登录成功: {}", identity);
                Ok(ArchiveSession::new(
                    session,
                    Box::new(fetcher),
                    self.config.archive_url("/users/logout"),
                ))
            }
            Err(e) => {
                fetcher.release().await;
                Err(e)
            }
        }
    }
}

/// 登录后的浏览器页面，作为抓取器使用
pub struct BrowserFetcher {
    browser: Option<Browser>,
    executor: Option<JsExecutor>,
    launched: bool,
    navigation_timeout: Duration,
}

impl BrowserFetcher {
    fn new(browser: Browser, launched: bool, executor: JsExecutor, config: &Config) -> Self {
        Self {
            browser: Some(browser),
            executor: Some(executor),
            launched,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }

    fn without_page(browser: Browser, launched: bool, config: &Config) -> Self {
        Self {
            browser: Some(browser),
            executor: None,
            launched,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        }
    }
}

/// 读取页面当前的地址和内容
async fn current_page(executor: &JsExecutor) -> Result<FetchedPage, AuthError> {
    let final_url = executor.current_url().await.map_err(|e| AuthError::Network(e.to_string()))?;
    let html = executor.html().await.map_err(|e| AuthError::Network(e.to_string()))?;
    Ok(FetchedPage {
        final_url,
        status: None,
        html,
    })
}

/// 在页面里构造一个隐藏表单并以 POST 提交
fn form_post_js(url: &str, form: &[(&str, &str)]) -> String {
    let action = serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string());
    let fields = serde_json::to_string(form).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
(() => {{
    const form = document.createElement('form');
    form.method = 'POST';
    form.action = {action};
    for (const [name, value] of {fields}) {{
        const input = document.createElement('input');
        input.type = 'hidden';
        input.name = name;
        input.value = value;
        form.appendChild(input);
    }}
    document.body.appendChild(form);
    form.submit();
    return true;
}})()
"#
    )
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError> {
        let executor = self.executor.as_ref().ok_or(AuthError::SessionNotFound)?;
        let loaded = executor
            .navigate(url, self.navigation_timeout)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if !loaded {
            warn!("⚠️ 页面加载超时，读取当前内容: {}", url);
        }
        current_page(executor).await
    }

    async fn submit_form(&self, url: &str, form: &[(&str, &str)]) -> Result<FetchedPage, AuthError> {
        let executor = self.executor.as_ref().ok_or(AuthError::SessionNotFound)?;
        let submitted = executor
            .eval(form_post_js(url, form))
            .await
            .map_err(|e| AuthError::SubmissionFailed(e.to_string()))?;
        if submitted.as_bool() != Some(true) {
            return Err(AuthError::SubmissionFailed(format!("无法在页面中提交表单: {}", url)));
        }
        if !executor.wait_for_transition(self.navigation_timeout).await {
            warn!("⚠️ 表单提交后等待跳转超时: {}", url);
        }
        current_page(executor).await
    }

    async fn release(&mut self) {
        if let Some(executor) = self.executor.take() {
            shutdown_step("关闭页面", executor.close().await);
        }
        if let Some(mut browser) = self.browser.take() {
            if self.launched {
                let closed = shutdown_step("关闭浏览器", browser.close().await);
                let exited = shutdown_step("等待浏览器进程退出", browser.wait().await);
                if closed && exited {
                    debug!("浏览器已关闭");
                }
            }
        }
    }
}

/// 记录一步清理的结果，失败只告警不中断后续清理
fn shutdown_step<T, E: std::fmt::Display>(step: &str, result: Result<T, E>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!("⚠️ {}失败: {}", step, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_post_js_escapes_values() {
        let js = form_post_js(
            "https://archiveofourown.org/users/logout",
            &[("_method", "delete"), ("authenticity_token", "a\"b")],
        );
        assert!(js.contains(r#"form.action = "https://archiveofourown.org/users/logout";"#));
        assert!(js.contains(r#"[["_method","delete"],["authenticity_token","a\"b"]]"#));
    }

    #[test]
    fn test_shutdown_step_reports_failure() {
        let exited: std::io::Result<Option<u32>> = Ok(None);
        assert!(shutdown_step("等待浏览器进程退出", exited));

        let failed: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Other, "zombie"));
        assert!(!shutdown_step("等待浏览器进程退出", failed));
    }
}
