//! 日志工具模块
//!
//! 提供日志初始化和运行进度输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::ImportReport;

/// 初始化日志，默认 `info`，可通过 `RUST_LOG` 覆盖
///
/// 重复调用不会报错
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录导入开始信息
pub fn log_import_start(identity: &str, batch_size: usize, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始导入书库 - 账号: {}", identity);
    info!("📊 每批 {} 条，最多 {} 批并发写入", batch_size, max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号（从 1 开始）
/// - `total_batches`: 批次总数
/// - `start`: 本批第一条的编号
/// - `end`: 本批最后一条的编号
/// - `total`: 条目总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("📦 开始写入第 {}/{} 批 (条目 {}-{} / 共 {} 条)", batch_num, total_batches, start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, accepted: usize, size: usize) {
    info!("✓ 第 {} 批完成: 写入 {}/{}", batch_num, accepted, size);
}

/// 打印最终报告
pub fn print_final_report(report: &ImportReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 导入完成统计");
    info!("完成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("{}", "=".repeat(60));
    for source in &report.sources {
        match &source.error {
            Some(err) => info!("  {:<24} ❌ {}", source.origin.to_string(), err),
            None => info!("  {:<24} {} 条", source.origin.to_string(), source.record_count),
        }
    }
    info!("🔎 抓取结果: {}", report.scrape.label());
    info!("📚 去重后作品: {}", report.unique_works);
    info!("✅ 已写入: {}", report.persisted_count);
    info!("🏁 结果: {}", report.outcome);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("同人作品标题很长", 4), "同人作品...");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init();
    }
}
