use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::work::{Origin, ReadingStatus, WorkRecord};

/// 一部作品在书库中的最终状态
///
/// 描述字段来自优先级最高的那条记录，标签类集合取并集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledLibraryEntry {
    pub work: WorkRecord,
    pub resolved_status: ReadingStatus,
    pub progress_percentage: u8,
    pub current_chapter: Option<u32>,
    /// 贡献过这部作品的所有来源
    pub sources: BTreeSet<Origin>,
    /// 最早的加入时间
    pub date_added: Option<DateTime<Utc>>,
}

impl ReconciledLibraryEntry {
    /// 单条记录直接生成条目
    pub fn from_record(record: WorkRecord) -> Self {
        let resolved_status = record.observed_status;
        let date_added = record.earliest_added_at();
        let sources = BTreeSet::from([record.origin]);
        let (progress_percentage, current_chapter) =
            derive_progress(resolved_status, record.chapters_current, record.chapters_total);

        Self {
            work: record,
            resolved_status,
            progress_percentage,
            current_chapter,
            sources,
            date_added,
        }
    }

    pub fn external_id(&self) -> &str {
        &self.work.external_id
    }

    /// 状态或章节变化后重新计算进度
    pub fn refresh_progress(&mut self) {
        let (progress, chapter) = derive_progress(
            self.resolved_status,
            self.work.chapters_current,
            self.work.chapters_total,
        );
        self.progress_percentage = progress;
        self.current_chapter = chapter;
    }
}

/// 根据状态推导进度百分比和当前章节
///
/// - 已读完：100%，当前章节为总章数（总章数未定时取已发布章数）
/// - 在读：按已发布 / 总章数估算，总章数未定时为 0
/// - 想读 / 待读：0%，没有当前章节
pub fn derive_progress(status: ReadingStatus, current: u32, total: Option<u32>) -> (u8, Option<u32>) {
    match status {
        ReadingStatus::Completed => (100, Some(total.unwrap_or(current))),
        ReadingStatus::Reading => {
            let progress = match total {
                Some(total) if total > 0 => ((u64::from(current) * 100) / u64::from(total)).min(100) as u8,
                _ => 0,
            };
            (progress, Some(current))
        }
        ReadingStatus::ToRead | ReadingStatus::WantToRead => (0, None),
    }
}
