use std::fmt;

use serde::Serialize;

use crate::models::work::{Origin, WorkRecord};

/// 兜底数据的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    /// 站点公开作品列表
    PublicListing,
    /// 内置示例数据
    BuiltInSample,
}

/// 实时抓取的结果，调用方据此区分真实数据与兜底数据
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    /// 没有提供账号，未进行实时抓取
    NotRequested,
    /// 登录成功后抓到的数据
    AuthenticatedData(Vec<WorkRecord>),
    /// 登录失败后的兜底数据
    PublicFallbackData {
        source: FallbackSource,
        reason: String,
        records: Vec<WorkRecord>,
    },
    /// 既没有登录数据也没有兜底数据
    NoDataAvailable { reason: String },
}

impl ScrapeOutcome {
    pub fn label(&self) -> String {
        match self {
            ScrapeOutcome::NotRequested => "未请求".to_string(),
            ScrapeOutcome::AuthenticatedData(records) => format!("登录数据 {} 条", records.len()),
            ScrapeOutcome::PublicFallbackData { source, reason, records } => {
                format!("兜底数据 {} 条 ({:?}，原因: {})", records.len(), source, reason)
            }
            ScrapeOutcome::NoDataAvailable { reason } => format!("无数据 ({})", reason),
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            ScrapeOutcome::AuthenticatedData(records) => records.len(),
            ScrapeOutcome::PublicFallbackData { records, .. } => records.len(),
            ScrapeOutcome::NotRequested | ScrapeOutcome::NoDataAvailable { .. } => 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ScrapeOutcome::PublicFallbackData { .. })
    }
}

/// 被拒绝的批次
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedBatch {
    /// 批次编号（从 0 开始）
    pub index: usize,
    pub size: usize,
    pub reason: String,
}

/// 批量写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub attempted_batches: usize,
    pub accepted_count: usize,
    pub rejected_batches: Vec<RejectedBatch>,
    /// 是否在批次之间被取消
    pub cancelled: bool,
}

impl LoadReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected_batches.iter().map(|b| b.size).sum()
    }
}

/// 单个来源的统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub origin: Origin,
    pub record_count: usize,
    /// 该来源解析 / 读取失败的原因
    pub error: Option<String>,
}

/// 导入的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ImportOutcome {
    Succeeded,
    PartiallyFailed(String),
    Failed(String),
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportOutcome::Succeeded => write!(f, "成功"),
            ImportOutcome::PartiallyFailed(reason) => write!(f, "部分失败: {}", reason),
            ImportOutcome::Failed(reason) => write!(f, "失败: {}", reason),
        }
    }
}

/// 返回给调用方的导入报告
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub identity: String,
    pub sources: Vec<SourceReport>,
    pub scrape: ScrapeOutcome,
    pub unique_works: usize,
    pub persisted_count: usize,
    pub load: Option<LoadReport>,
    pub outcome: ImportOutcome,
    /// 导入成功后登记的本地会话 ID
    pub session_id: Option<String>,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ImportOutcome::Failed(_))
    }

    pub fn count_for(&self, origin: Origin) -> usize {
        self.sources
            .iter()
            .filter(|s| s.origin == origin)
            .map(|s| s.record_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_count() {
        let report = LoadReport {
            attempted_batches: 3,
            accepted_count: 100,
            rejected_batches: vec![RejectedBatch {
                index: 1,
                size: 50,
                reason: "constraint".into(),
            }],
            cancelled: false,
        };
        assert_eq!(report.rejected_count(), 50);
    }

    #[test]
    fn test_scrape_outcome_distinguishes_fallback() {
        let real = ScrapeOutcome::AuthenticatedData(vec![WorkRecord::new("1", Origin::LiveScrape)]);
        let fallback = ScrapeOutcome::PublicFallbackData {
            source: FallbackSource::BuiltInSample,
            reason: "登录失败".into(),
            records: vec![WorkRecord::new("2", Origin::LiveScrape)],
        };
        assert!(!real.is_fallback());
        assert!(fallback.is_fallback());
        assert_eq!(real.record_count(), 1);
        assert_eq!(ScrapeOutcome::NoDataAvailable { reason: "x".into() }.record_count(), 0);
    }
}
