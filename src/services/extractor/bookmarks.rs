//! 书签页导出（完整 HTML 页面）的解析
//!
//! 不同版本的导出页面嵌套层级不一致，所以不依赖固定的作品块选择器：
//! 先找到所有标题链接，再向上推断它所在的容器。

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::dom::{closest_with_class, nth_parent, selector};
use super::listing::read_block;
use crate::models::{Origin, WorkRecord};

static HEADING_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"h4.heading a[href*="/works/"]"#));

/// 解析书签导出页面
///
/// 缺少标题或作者的条目视为页面噪声，直接丢弃
pub fn parse_bookmarks(html: &str, base_url: &str) -> Vec<WorkRecord> {
    let document = Html::parse_document(html);

    let mut discarded = 0usize;
    let records: Vec<WorkRecord> = document
        .select(&HEADING_LINK)
        .filter_map(|link| {
            let container = enclosing_container(link)?;
            let record = read_block(container, link, Origin::BookmarksExport, base_url)?;
            if record.title.is_empty() || record.author.is_empty() {
                discarded += 1;
                return None;
            }
            Some(record)
        })
        .collect();

    debug!("书签导出解析出 {} 部作品，丢弃 {} 个不完整条目", records.len(), discarded);
    records
}

/// 标题链接所在的作品容器：优先取 `.header` 的父元素，否则向上两层
fn enclosing_container(link: ElementRef<'_>) -> Option<ElementRef<'_>> {
    closest_with_class(link, "header")
        .and_then(|header| header.parent().and_then(ElementRef::wrap))
        .or_else(|| nth_parent(link, 2))
}
