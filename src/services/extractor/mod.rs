//! 作品提取器
//!
//! 把四种来源的原始载荷（列表页 HTML、书签导出 HTML、两种扩展导出 JSON）
//! 统一转换为 `WorkRecord`。

pub mod bookmarks;
pub mod canonical;
mod dom;
pub mod export_json;
pub mod listing;

use std::fmt;

use tracing::debug;

use crate::error::ParseError;
use crate::models::{Origin, ReadingStatus, WorkRecord};

pub use canonical::{parse_chapters, parse_count, parse_labeled_number, StatLabel};
pub use listing::next_page_url;

/// 一次提取产生的记录序列
///
/// 只能消费一次；JSON 来源按需逐条转换
pub struct WorkStream {
    inner: Box<dyn Iterator<Item = WorkRecord> + Send>,
}

impl WorkStream {
    fn new(inner: impl Iterator<Item = WorkRecord> + Send + 'static) -> Self {
        Self { inner: Box::new(inner) }
    }
}

impl Iterator for WorkStream {
    type Item = WorkRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for WorkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkStream").finish_non_exhaustive()
    }
}

/// 作品提取器
#[derive(Debug, Clone)]
pub struct WorkExtractor {
    base_url: String,
}

impl WorkExtractor {
    /// # 参数
    /// - `base_url`: 站点根地址，用来补全相对链接
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// 按来源的默认状态提取
    pub fn extract(&self, origin: Origin, payload: &str) -> Result<WorkStream, ParseError> {
        self.extract_with(origin, payload, None)
    }

    /// 提取记录，可选地覆盖观测状态
    ///
    /// # 参数
    /// - `origin`: 载荷来源
    /// - `payload`: 原始 HTML 或 JSON 文本
    /// - `status_override`: 调用方已知的状态（例如实时抓取阅读历史时为已读完）
    ///
    /// # 返回
    /// HTML 中找不到作品块时返回空序列；JSON 无效时返回 `ParseError`
    pub fn extract_with(
        &self,
        origin: Origin,
        payload: &str,
        status_override: Option<ReadingStatus>,
    ) -> Result<WorkStream, ParseError> {
        let stream = match origin {
            Origin::LiveScrape => {
                WorkStream::new(listing::parse_listing(payload, &self.base_url).into_iter())
            }
            Origin::BookmarksExport => {
                WorkStream::new(bookmarks::parse_bookmarks(payload, &self.base_url).into_iter())
            }
            Origin::HistoryExport | Origin::MarkedForLaterExport => {
                let entries = export_json::entries_from_payload(payload, origin)?;
                debug!("{} 导出包含 {} 个条目", origin, entries.len());
                let base_url = self.base_url.clone();
                WorkStream::new(
                    entries
                        .into_iter()
                        .filter_map(move |entry| export_json::normalize_entry(&entry, origin, &base_url)),
                )
            }
        };

        Ok(match status_override {
            Some(status) => WorkStream::new(stream.map(move |record| record.with_status(status))),
            None => stream,
        })
    }
}
