//! 登录结果判定
//!
//! 浏览器和 HTTP 两种登录方式提交表单后，都把看到的页面整理成同一个
//! `LoginProbe`，再由 `classify` 判定。成功必须有明确信号：跳转到本人主页、
//! 页面出现登出入口、或者拿到会话 Cookie。

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::error::AuthError;
use crate::models::SessionToken;

/// 站点会话 Cookie 名称
pub const SESSION_COOKIE: &str = "_otwarchive_session";

static ERROR_BANNER: Lazy<Selector> = Lazy::new(|| {
    parse(".flash.error, .alert-error, .notice.error, .message.error, .error, .alert")
});
static LOGIN_FORM: Lazy<Selector> = Lazy::new(|| {
    parse(r#"#user_password, input[name="user[password]"], input[type="password"]"#)
});
static LOGOUT_LINK: Lazy<Selector> =
    Lazy::new(|| parse(r#"a[href*="logout"], a[href*="signout"], a[href*="sign_out"]"#));
static ANCHOR: Lazy<Selector> = Lazy::new(|| parse("a"));

fn parse(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// 提交登录表单后观察到的页面状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginProbe {
    pub final_url: String,
    /// 页面上的错误提示文本
    pub error_banner: Option<String>,
    /// 页面上是否还有密码输入框
    pub login_form_present: bool,
    /// 会话 Cookie 的值
    pub session_cookie: Option<String>,
    /// 页面上是否有登出入口
    pub logout_link_present: bool,
    /// 等待跳转是否超时
    pub timed_out: bool,
    pub timeout_secs: u64,
}

impl LoginProbe {
    /// 从最终页面的 HTML 中读出各项信号
    pub fn from_page(final_url: &str, html: &str, session_cookie: Option<String>) -> Self {
        let document = Html::parse_document(html);

        let error_banner = document
            .select(&ERROR_BANNER)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|text| !text.is_empty());

        let login_form_present = document.select(&LOGIN_FORM).next().is_some();

        let logout_link_present = document.select(&LOGOUT_LINK).next().is_some()
            || document.select(&ANCHOR).any(|a| {
                let text = a.text().collect::<String>().to_ascii_lowercase();
                let text = text.trim();
                text == "log out" || text == "logout" || text == "sign out"
            });

        Self {
            final_url: final_url.to_string(),
            error_banner,
            login_form_present,
            session_cookie: session_cookie.filter(|c| !c.is_empty()),
            logout_link_present,
            timed_out: false,
            timeout_secs: 0,
        }
    }

    /// 标记等待跳转超时
    pub fn with_timeout(mut self, timed_out: bool, timeout_secs: u64) -> Self {
        self.timed_out = timed_out;
        self.timeout_secs = timeout_secs;
        self
    }

    fn path(&self) -> &str {
        let without_scheme = self
            .final_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.final_url);
        without_scheme
            .find('/')
            .map(|idx| &without_scheme[idx..])
            .unwrap_or("/")
    }

    fn on_login_path(&self) -> bool {
        let path = self.path();
        let path = path.split(['?', '#']).next().unwrap_or(path);
        path.ends_with("/login") || path.contains("/login/")
    }

    fn on_profile_of(&self, identity: &str) -> bool {
        let profile = format!("/users/{}", identity.to_ascii_lowercase());
        let path = self.path().to_ascii_lowercase();
        path == profile || path.starts_with(&format!("{}/", profile)) || path.starts_with(&format!("{}?", profile))
    }
}

/// 地址是否为登录页（未登录访问私有页面时站点会跳转到这里）
pub fn is_login_url(url: &str) -> bool {
    LoginProbe {
        final_url: url.to_string(),
        ..LoginProbe::default()
    }
    .on_login_path()
}

/// 判定登录结果
///
/// 判定顺序：
/// 1. 仍在登录页且有错误提示 → `InvalidCredentials`
/// 2. 仍在登录页 → 超时时为 `AmbiguousTimeout`，否则 `InvalidCredentials`
///    （登录页也会下发匿名会话 Cookie，停在登录页时 Cookie 不算成功信号）
/// 3. 有会话 Cookie → 返回 Cookie；跳转到本人主页或出现登出入口 → `Authenticated`
/// 4. 没有任何信号 → 超时时为 `AmbiguousTimeout`，否则 `SessionNotFound`
pub fn classify(probe: &LoginProbe, identity: &str) -> Result<SessionToken, AuthError> {
    if probe.on_login_path() {
        if let Some(banner) = &probe.error_banner {
            return Err(AuthError::InvalidCredentials(banner.clone()));
        }
        if probe.timed_out {
            return Err(AuthError::AmbiguousTimeout(probe.timeout_secs));
        }
        return Err(AuthError::InvalidCredentials("仍停留在登录页".to_string()));
    }

    if let Some(cookie) = &probe.session_cookie {
        return Ok(SessionToken::Cookie(cookie.clone()));
    }
    if probe.on_profile_of(identity) || probe.logout_link_present {
        return Ok(SessionToken::Authenticated);
    }

    if probe.timed_out {
        Err(AuthError::AmbiguousTimeout(probe.timeout_secs))
    } else {
        Err(AuthError::SessionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE_WITH_ERROR: &str = r#"
        <div class="flash error">The password or user name you entered doesn't match our records.</div>
        <form action="/users/login"><input id="user_login" type="text"><input id="user_password" type="password"></form>"#;
    const LOGIN_PAGE: &str = r#"<form action="/users/login"><input type="text"><input type="password"></form>"#;
    const DASHBOARD: &str = r#"<ul class="user navigation"><li><a href="/users/logout">Log Out</a></li></ul>"#;

    #[test]
    fn test_error_banner_on_login_page_is_invalid_credentials() {
        let probe = LoginProbe::from_page("https://archiveofourown.org/users/login", LOGIN_PAGE_WITH_ERROR, None);
        match classify(&probe, "reader") {
            Err(AuthError::InvalidCredentials(msg)) => assert!(msg.contains("doesn't match")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_form_still_present() {
        let probe = LoginProbe::from_page("https://archiveofourown.org/users/login", LOGIN_PAGE, None);
        assert!(matches!(classify(&probe, "reader"), Err(AuthError::InvalidCredentials(_))));

        let timed_out = probe.with_timeout(true, 45);
        assert_eq!(classify(&timed_out, "reader"), Err(AuthError::AmbiguousTimeout(45)));
    }

    #[test]
    fn test_anonymous_cookie_on_login_page_is_not_success() {
        let loading = LoginProbe::from_page(
            "https://archiveofourown.org/users/login",
            "<p>Loading...</p>",
            Some("anon".into()),
        );
        assert!(!loading.login_form_present);
        assert!(matches!(classify(&loading, "reader"), Err(AuthError::InvalidCredentials(_))));

        let timed_out = loading.with_timeout(true, 45);
        assert_eq!(classify(&timed_out, "reader"), Err(AuthError::AmbiguousTimeout(45)));
    }

    #[test]
    fn test_cookie_is_returned() {
        let probe = LoginProbe::from_page(
            "https://archiveofourown.org/users/reader",
            "<p>hi</p>",
            Some("cookie-value".into()),
        );
        assert_eq!(classify(&probe, "reader"), Ok(SessionToken::Cookie("cookie-value".into())));
    }

    #[test]
    fn test_profile_redirect_without_cookie() {
        let probe = LoginProbe::from_page("https://archiveofourown.org/users/Reader/works", "<p></p>", None);
        assert_eq!(classify(&probe, "reader"), Ok(SessionToken::Authenticated));

        let other_user = LoginProbe::from_page("https://archiveofourown.org/users/readerx", "<p></p>", None);
        assert_eq!(classify(&other_user, "reader"), Err(AuthError::SessionNotFound));
    }

    #[test]
    fn test_is_login_url() {
        assert!(is_login_url("https://archiveofourown.org/users/login?return_to=%2Fusers%2Fx%2Freadings"));
        assert!(is_login_url("/users/login"));
        assert!(!is_login_url("https://archiveofourown.org/users/x/readings"));
    }

    #[test]
    fn test_logout_link_is_success() {
        let probe = LoginProbe::from_page("https://archiveofourown.org/", DASHBOARD, None);
        assert!(probe.logout_link_present);
        assert_eq!(classify(&probe, "reader"), Ok(SessionToken::Authenticated));
    }

    #[test]
    fn test_timeout_without_signal_is_not_success() {
        let probe = LoginProbe::from_page("https://archiveofourown.org/", "<p>loading</p>", None).with_timeout(true, 45);
        assert_eq!(classify(&probe, "reader"), Err(AuthError::AmbiguousTimeout(45)));

        let no_timeout = LoginProbe::from_page("https://archiveofourown.org/", "<p>loading</p>", None);
        assert_eq!(classify(&no_timeout, "reader"), Err(AuthError::SessionNotFound));
    }
}
