use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// 登录后实时抓取的列表页
    LiveScrape,
    /// 书签页导出的 HTML
    BookmarksExport,
    /// 浏览器扩展导出的阅读历史 JSON
    HistoryExport,
    /// 浏览器扩展导出的稍后阅读 JSON
    MarkedForLaterExport,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::LiveScrape => "live_scrape",
            Origin::BookmarksExport => "bookmarks_export",
            Origin::HistoryExport => "history_export",
            Origin::MarkedForLaterExport => "marked_for_later_export",
        }
    }

    /// 该来源的默认阅读状态
    pub fn default_status(self) -> ReadingStatus {
        match self {
            Origin::BookmarksExport => ReadingStatus::WantToRead,
            Origin::HistoryExport => ReadingStatus::Completed,
            Origin::MarkedForLaterExport | Origin::LiveScrape => ReadingStatus::ToRead,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阅读状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingStatus {
    ToRead,
    WantToRead,
    Reading,
    Completed,
}

impl ReadingStatus {
    /// 合并时的优先级，数值越大越优先
    pub fn priority(self) -> u8 {
        match self {
            ReadingStatus::Completed => 3,
            ReadingStatus::Reading => 2,
            ReadingStatus::WantToRead => 1,
            ReadingStatus::ToRead => 0,
        }
    }

    pub fn outranks(self, other: ReadingStatus) -> bool {
        self.priority() > other.priority()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadingStatus::ToRead => "to-read",
            ReadingStatus::WantToRead => "want-to-read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 某个来源对一部作品的一次观测
///
/// 只由提取器生成，生成后不再修改。列表字段缺省为空，数值字段缺省为 0。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub external_id: String,
    pub title: String,
    pub author: String,
    pub author_url: String,
    pub fandoms: Vec<String>,
    pub relationships: Vec<String>,
    pub characters: Vec<String>,
    pub tags: Vec<String>,
    pub rating: String,
    pub warnings: Vec<String>,
    pub categories: Vec<String>,
    pub word_count: u64,
    pub chapters_current: u32,
    /// `None` 表示连载中、总章数未定
    pub chapters_total: Option<u32>,
    pub kudos: u64,
    pub hits: u64,
    pub bookmark_count: u64,
    pub comment_count: u64,
    pub summary: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub origin: Origin,
    pub observed_status: ReadingStatus,
    pub visited_at: Option<DateTime<Utc>>,
    pub bookmarked_at: Option<DateTime<Utc>>,
    pub marked_at: Option<DateTime<Utc>>,
    pub visit_count: u32,
}

impl WorkRecord {
    /// 创建一条只有 ID 的空记录，其余字段为默认值
    pub fn new(external_id: impl Into<String>, origin: Origin) -> Self {
        Self {
            external_id: external_id.into(),
            title: String::new(),
            author: String::new(),
            author_url: String::new(),
            fandoms: Vec::new(),
            relationships: Vec::new(),
            characters: Vec::new(),
            tags: Vec::new(),
            rating: String::new(),
            warnings: Vec::new(),
            categories: Vec::new(),
            word_count: 0,
            chapters_current: 0,
            chapters_total: None,
            kudos: 0,
            hits: 0,
            bookmark_count: 0,
            comment_count: 0,
            summary: String::new(),
            url: String::new(),
            published_at: None,
            updated_at: None,
            origin,
            observed_status: origin.default_status(),
            visited_at: None,
            bookmarked_at: None,
            marked_at: None,
            visit_count: 0,
        }
    }

    pub fn with_status(mut self, status: ReadingStatus) -> Self {
        self.observed_status = status;
        self
    }

    /// 最早的"加入书库"时间：书签、标记、访问三者取最早
    pub fn earliest_added_at(&self) -> Option<DateTime<Utc>> {
        [self.bookmarked_at, self.marked_at, self.visited_at]
            .into_iter()
            .flatten()
            .min()
    }
}

impl fmt::Display for WorkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} by {} [{}]",
            self.external_id, self.title, self.author, self.observed_status
        )
    }
}
