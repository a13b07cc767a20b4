use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 登录 / 会话相关错误
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),
    /// 导出文件或页面解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 存储层错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 导入流程错误
    #[error("导入错误: {0}")]
    Import(#[from] ImportError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 认证相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// 登录页上找不到账号 / 密码输入框
    #[error("未找到登录表单")]
    LoginFormNotFound,
    /// 所有提交方式均失败
    #[error("登录表单提交失败: {0}")]
    SubmissionFailed(String),
    /// 页面出现明确的错误提示，或仍停留在登录表单
    #[error("账号或密码错误: {0}")]
    InvalidCredentials(String),
    /// 没有任何明确的登录成功信号
    #[error("未获得有效会话")]
    SessionNotFound,
    /// 等待页面跳转超时且没有成功信号，可重试
    #[error("等待登录跳转超时 ({0} 秒)，无法确认登录状态")]
    AmbiguousTimeout(u64),
    /// 当前环境无法使用浏览器自动化
    #[error("浏览器不可用: {0}")]
    BrowserUnavailable(String),
    /// 网络请求失败
    #[error("网络请求失败: {0}")]
    Network(String),
}

impl AuthError {
    /// 是否值得再试一次登录
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::AmbiguousTimeout(_) | AuthError::Network(_))
    }
}

/// 解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON 语法错误
    #[error("JSON 格式无效: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// JSON 合法，但结构无法识别
    #[error("无法识别的导出结构: {0}")]
    UnexpectedShape(String),
}

/// 存储层错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// 存储不可达，整个加载过程中止
    #[error("存储不可用: {0}")]
    Unavailable(String),
    /// 单个批次违反约束被拒绝，跳过后继续
    #[error("批次被拒绝: {0}")]
    BatchRejected(String),
}

/// 导入流程错误
#[derive(Debug, Error)]
pub enum ImportError {
    /// 部分批次写入失败
    #[error("{failed}/{total} 个批次写入失败")]
    PartialImport { failed: usize, total: usize },
    /// 存储不可用，加载被整体中止
    #[error("存储不可用，导入中止: {0}")]
    StoreUnavailable(String),
    /// 没有任何可导入的数据
    #[error("没有可导入的数据: {0}")]
    NothingToImport(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件 {path} 失败: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("解析配置文件 {path} 失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 必需的配置项缺失
    #[error("缺少配置项 {0}")]
    Missing(String),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AuthError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AuthError::SubmissionFailed(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_auth_errors() {
        assert!(AuthError::AmbiguousTimeout(45).is_retryable());
        assert!(AuthError::Network("reset".into()).is_retryable());
        assert!(!AuthError::InvalidCredentials("bad".into()).is_retryable());
        assert!(!AuthError::LoginFormNotFound.is_retryable());
    }

    #[test]
    fn test_app_error_wraps_sources() {
        let err: AppError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.to_string(), "存储错误: 存储不可用: down");

        let err: AppError = ImportError::PartialImport { failed: 1, total: 3 }.into();
        assert!(err.to_string().contains("1/3"));

        let err: AppError = ConfigError::Missing("STORE_URL".into()).into();
        assert_eq!(err.to_string(), "配置错误: 缺少配置项 STORE_URL");
    }
}
