//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"导航 / 执行 JS / 读取页面"的能力

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use serde_json::Value as JsonValue;
use tracing::debug;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露导航、eval、读取 URL / HTML / Cookie 的能力
/// - 不认识登录表单，也不认识作品列表
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于查找元素等操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 导航到指定 URL
    ///
    /// # 返回
    /// - `Ok(true)`: 在超时内完成导航
    /// - `Ok(false)`: 超时，页面停留在当前状态
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<bool> {
        debug!("导航到: {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(result) => {
                result.with_context(|| format!("导航到 {} 失败", url))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// 等待一次页面跳转
    ///
    /// # 返回
    /// 超时返回 `false`，不视为错误
    pub async fn wait_for_transition(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("等待跳转出错: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn html(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    /// 读取当前页面的某个 Cookie 值
    pub async fn cookie(&self, name: &str) -> Result<Option<String>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
            .filter(|v| !v.is_empty()))
    }

    /// 关闭页面，释放资源
    pub async fn close(self) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
