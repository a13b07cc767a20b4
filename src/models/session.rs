use std::fmt;

/// 站点会话凭据
#[derive(Clone, PartialEq, Eq)]
pub enum SessionToken {
    /// 站点下发的会话 Cookie 值
    Cookie(String),
    /// 已确认登录，但拿不到 Cookie 值
    Authenticated,
}

impl SessionToken {
    pub fn cookie_value(&self) -> Option<&str> {
        match self {
            SessionToken::Cookie(value) => Some(value),
            SessionToken::Authenticated => None,
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionToken::Cookie(_) => f.write_str("Cookie(***)"),
            SessionToken::Authenticated => f.write_str("Authenticated"),
        }
    }
}

/// 一次抓取期间有效的登录会话
///
/// 只在单次抓取内存活，不落盘；登出或认证失败后失效
#[derive(Debug)]
pub struct AuthSession {
    identity: String,
    token: SessionToken,
    valid: bool,
}

impl AuthSession {
    pub fn new(identity: impl Into<String>, token: SessionToken) -> Self {
        Self {
            identity: identity.into(),
            token,
            valid: true,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_cookie() {
        let session = AuthSession::new("reader", SessionToken::Cookie("abc123secret".into()));
        let printed = format!("{:?}", session);
        assert!(!printed.contains("abc123secret"));
        assert!(printed.contains("reader"));
    }

    #[test]
    fn test_invalidate() {
        let mut session = AuthSession::new("reader", SessionToken::Authenticated);
        assert!(session.is_valid());
        assert_eq!(session.token().cookie_value(), None);
        session.invalidate();
        assert!(!session.is_valid());
    }
}
