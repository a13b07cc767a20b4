//! 导入上下文
//!
//! 封装"这是谁的哪一次导入"这一信息，只用于日志和报告

use std::fmt::Display;

use uuid::Uuid;

/// 导入上下文
#[derive(Debug, Clone)]
pub struct ImportCtx {
    /// 本次导入的 ID
    pub import_id: String,

    /// 书库所有者
    pub owner_id: String,

    /// 站点账号（离线导入时为空）
    pub identity: Option<String>,
}

impl ImportCtx {
    pub fn new(owner_id: impl Into<String>, identity: Option<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            import_id: id[..8].to_string(),
            owner_id: owner_id.into(),
            identity,
        }
    }

    /// 用于日志的账号名
    pub fn identity_label(&self) -> &str {
        self.identity.as_deref().unwrap_or("(离线)")
    }
}

impl Display for ImportCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[导入 #{} 所有者#{} 账号#{}]",
            self.import_id,
            self.owner_id,
            self.identity_label()
        )
    }
}
