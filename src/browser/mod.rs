//! 浏览器的获取：启动新的无头浏览器，或者连接到已有的调试端口

pub mod connection;
pub mod headless;

use anyhow::Result;
use chromiumoxide::Browser;

use crate::config::Config;

pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;

/// 按配置获取浏览器
///
/// # 返回
/// `(browser, launched)`：`launched` 为 `true` 时浏览器归本进程所有，用完需要关闭；
/// 连接到的外部浏览器只关闭自己打开的页面
pub async fn open_browser(config: &Config) -> Result<(Browser, bool)> {
    match config.browser_debug_port {
        Some(port) => Ok((connect_to_browser(port).await?, false)),
        None => Ok((launch_headless_browser(config).await?, true)),
    }
}
