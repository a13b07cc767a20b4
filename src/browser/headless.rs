use std::path::Path;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;

/// 启动无头浏览器
///
/// 未配置可执行文件路径时由 chromiumoxide 自动探测
pub async fn launch_headless_browser(config: &Config) -> Result<Browser> {
    info!("🚀 启动无头浏览器...");

    let user_agent = format!("--user-agent={}", config.user_agent);
    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .request_timeout(std::time::Duration::from_secs(config.navigation_timeout_secs))
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--no-first-run",
            "--no-zygote",
            user_agent.as_str(),
        ]);

    if let Some(executable) = config.browser_executable.as_deref() {
        debug!("浏览器路径: {}", executable);
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        anyhow::anyhow!("配置无头浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        anyhow::anyhow!("启动无头浏览器失败: {}", e)
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    Ok(browser)
}
