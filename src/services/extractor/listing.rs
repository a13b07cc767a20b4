//! 列表页（实时抓取）的作品块解析
//!
//! 列表页由重复的作品块组成，字段按结构位置读取：标题链接、署名、标签组、
//! 统计行。统计行是自由文本，用带标签的数字模式解析。

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::canonical::{
    absolute_url, parse_chapters, parse_datetime, parse_labeled_number, work_id_from_href, work_url, StatLabel,
};
use super::dom::{all_texts, element_text, first_attr, first_text, selector, split_commas};
use crate::models::{Origin, WorkRecord};

struct ListingSelectors {
    block: Selector,
    heading_link: Selector,
    author: Selector,
    byline: Selector,
    fandoms: Selector,
    relationships: Selector,
    characters: Selector,
    freeforms: Selector,
    warnings: Selector,
    required_warnings: Selector,
    rating: Selector,
    categories: Selector,
    stats: Selector,
    summary: Selector,
    header_datetime: Selector,
    user_datetime: Selector,
    next_page: Selector,
}

static SELECTORS: Lazy<ListingSelectors> = Lazy::new(|| ListingSelectors {
    block: selector(".work.blurb, .bookmark.blurb"),
    heading_link: selector(r#"h4.heading a[href*="/works/"]"#),
    author: selector(r#"a[rel="author"]"#),
    byline: selector("h4.heading"),
    fandoms: selector(".fandoms a.tag"),
    relationships: selector(".relationships a.tag"),
    characters: selector(".characters a.tag"),
    freeforms: selector(".freeforms a.tag"),
    warnings: selector("li.warnings a.tag"),
    required_warnings: selector(".required-tags .warnings .text"),
    rating: selector(".required-tags .rating .text, .rating .text"),
    categories: selector(".required-tags .category .text, .category .text"),
    stats: selector("dl.stats"),
    summary: selector("blockquote.summary"),
    header_datetime: selector(".header p.datetime"),
    user_datetime: selector(".user p.datetime, .user .datetime"),
    next_page: selector(r#"li.next a[rel="next"], a[rel="next"]"#),
});

/// 解析列表页中的所有作品块
///
/// 没有任何作品块时返回空列表，不报错
pub fn parse_listing(html: &str, base_url: &str) -> Vec<WorkRecord> {
    let document = Html::parse_document(html);
    let s = &*SELECTORS;

    let records: Vec<WorkRecord> = document
        .select(&s.block)
        .filter_map(|block| parse_work_block(block, base_url))
        .collect();

    debug!("列表页解析出 {} 个作品块", records.len());
    records
}

/// 列表页的"下一页"链接（绝对地址）
pub fn next_page_url(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    first_attr(document.root_element(), &SELECTORS.next_page, "href")
        .map(|href| absolute_url(base_url, &href))
}

fn parse_work_block(block: ElementRef<'_>, base_url: &str) -> Option<WorkRecord> {
    let link = block.select(&SELECTORS.heading_link).next()?;
    let mut record = read_block(block, link, Origin::LiveScrape, base_url)?;

    if record.title.is_empty() {
        record.title = "Untitled".to_string();
    }
    if record.author.is_empty() {
        // 匿名作品没有作者链接，署名里只有纯文本
        let byline = first_text(block, &SELECTORS.byline).unwrap_or_default();
        record.author = byline
            .rsplit_once(" by ")
            .map(|(_, name)| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Anonymous".to_string());
    }

    Some(record)
}

/// 从一个作品块中读取所有字段
///
/// # 参数
/// - `block`: 作品块（或推断出的容器）
/// - `link`: 标题链接，作品 ID 从它的 href 中取
///
/// # 返回
/// 链接里没有作品 ID 时返回 `None`；标题和作者可能为空，由调用方决定如何处理
pub(crate) fn read_block(
    block: ElementRef<'_>,
    link: ElementRef<'_>,
    origin: Origin,
    base_url: &str,
) -> Option<WorkRecord> {
    let s = &*SELECTORS;

    let external_id = link.value().attr("href").and_then(work_id_from_href)?;
    if external_id.is_empty() {
        return None;
    }

    let mut record = WorkRecord::new(external_id, origin);
    record.title = element_text(link);

    if let Some(author) = block.select(&s.author).next() {
        record.author = element_text(author);
        record.author_url = author
            .value()
            .attr("href")
            .map(|href| absolute_url(base_url, href))
            .unwrap_or_default();
    }

    record.fandoms = all_texts(block, &s.fandoms);
    record.relationships = all_texts(block, &s.relationships);
    record.characters = all_texts(block, &s.characters);
    record.tags = all_texts(block, &s.freeforms);
    record.warnings = all_texts(block, &s.warnings);
    if record.warnings.is_empty() {
        record.warnings = split_commas(all_texts(block, &s.required_warnings));
    }
    record.rating = first_text(block, &s.rating).unwrap_or_default();
    record.categories = split_commas(all_texts(block, &s.categories));

    if let Some(stats) = first_text(block, &s.stats) {
        apply_stats(&mut record, &stats);
    }

    record.summary = first_text(block, &s.summary).unwrap_or_default();
    record.updated_at = first_text(block, &s.header_datetime).and_then(|t| parse_datetime(&t));
    record.bookmarked_at = first_text(block, &s.user_datetime).and_then(|t| parse_datetime(&t));
    record.url = work_url(base_url, &record.external_id);

    Some(record)
}

/// 把统计行中的数字写入记录
pub(crate) fn apply_stats(record: &mut WorkRecord, stats: &str) {
    record.word_count = parse_labeled_number(stats, StatLabel::Words);
    record.kudos = parse_labeled_number(stats, StatLabel::Kudos);
    record.hits = parse_labeled_number(stats, StatLabel::Hits);
    record.bookmark_count = parse_labeled_number(stats, StatLabel::Bookmarks);
    record.comment_count = parse_labeled_number(stats, StatLabel::Comments);

    let chapter_text = stats
        .find("Chapters")
        .map(|idx| &stats[idx..])
        .unwrap_or(stats);
    let (current, total) = parse_chapters(chapter_text);
    record.chapters_current = current;
    record.chapters_total = total;
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://archiveofourown.org";

    fn blurb(id: &str, title: &str, author: Option<&str>, chapters: &str) -> String {
        let byline = match author {
            Some(a) => format!(r#"by <a rel="author" href="/users/{a}/pseuds/{a}">{a}</a>"#),
            None => "by Anonymous".to_string(),
        };
        format!(
            r#"
            <li id="work_{id}" class="work blurb group" role="article">
              <div class="header module">
                <h4 class="heading"><a href="/works/{id}">{title}</a> {byline}</h4>
                <h5 class="fandoms heading"><span class="landmark">Fandoms:</span>
                  <a class="tag" href="/tags/A">Fandom A</a>, <a class="tag" href="/tags/B">Fandom B</a></h5>
                <ul class="required-tags">
                  <li><span class="rating-teen rating" title="Teen And Up Audiences"><span class="text">Teen And Up Audiences</span></span></li>
                  <li><span class="warning-no warnings"><span class="text">No Archive Warnings Apply</span></span></li>
                  <li><span class="category-slash category"><span class="text">F/M, M/M</span></span></li>
                </ul>
                <p class="datetime">12 Mar 2023</p>
              </div>
              <ul class="tags commas">
                <li class="warnings"><strong><a class="tag">No Archive Warnings Apply</a></strong></li>
                <li class="relationships"><a class="tag">A/B</a></li>
                <li class="characters"><a class="tag">A</a></li><li class="characters"><a class="tag">B</a></li>
                <li class="freeforms"><a class="tag">Fluff</a></li>
              </ul>
              <blockquote class="userstuff summary"><p>A summary.</p></blockquote>
              <dl class="stats">
                <dt class="language">Language:</dt><dd class="language">English</dd>
                <dt class="words">Words:</dt><dd class="words">12,345</dd>
                <dt class="chapters">Chapters:</dt><dd class="chapters"><a>{chapters}</a></dd>
                <dt class="comments">Comments:</dt><dd class="comments"><a>5</a></dd>
                <dt class="kudos">Kudos:</dt><dd class="kudos"><a>1,234</a></dd>
                <dt class="bookmarks">Bookmarks:</dt><dd class="bookmarks"><a>10</a></dd>
                <dt class="hits">Hits:</dt><dd class="hits">9,876</dd>
              </dl>
            </li>"#
        )
    }

    #[test]
    fn test_parse_listing_reads_structure() {
        let html = format!(
            "<html><body><ol class=\"work index group\">{}</ol></body></html>",
            blurb("101", "First Work", Some("writer"), "3/?")
        );

        let records = parse_listing(&html, BASE);
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.external_id, "101");
        assert_eq!(r.title, "First Work");
        assert_eq!(r.author, "writer");
        assert_eq!(r.author_url, "https://archiveofourown.org/users/writer/pseuds/writer");
        assert_eq!(r.fandoms, vec!["Fandom A", "Fandom B"]);
        assert_eq!(r.relationships, vec!["A/B"]);
        assert_eq!(r.characters, vec!["A", "B"]);
        assert_eq!(r.tags, vec!["Fluff"]);
        assert_eq!(r.warnings, vec!["No Archive Warnings Apply"]);
        assert_eq!(r.categories, vec!["F/M", "M/M"]);
        assert_eq!(r.rating, "Teen And Up Audiences");
        assert_eq!(r.word_count, 12345);
        assert_eq!(r.kudos, 1234);
        assert_eq!(r.hits, 9876);
        assert_eq!(r.bookmark_count, 10);
        assert_eq!(r.comment_count, 5);
        assert_eq!(r.chapters_current, 3);
        assert_eq!(r.chapters_total, None);
        assert_eq!(r.summary, "A summary.");
        assert!(r.updated_at.is_some());
        assert_eq!(r.url, "https://archiveofourown.org/works/101");
        assert_eq!(r.origin, Origin::LiveScrape);
    }

    #[test]
    fn test_anonymous_author() {
        let html = blurb("7", "Anon Work", None, "1/1");
        let records = parse_listing(&html, BASE);
        assert_eq!(records[0].author, "Anonymous");
        assert_eq!(records[0].chapters_total, Some(1));
    }

    #[test]
    fn test_no_blocks_is_empty() {
        assert!(parse_listing("<html><body><p>Nothing here</p></body></html>", BASE).is_empty());
        assert!(parse_listing("", BASE).is_empty());
    }

    #[test]
    fn test_block_without_work_link_is_skipped() {
        let html = r#"<li class="work blurb"><h4 class="heading"><a href="/series/5">Series</a></h4></li>"#;
        assert!(parse_listing(html, BASE).is_empty());
    }

    #[test]
    fn test_next_page_url() {
        let html = r#"<ol class="pagination"><li class="next"><a rel="next" href="/users/x/readings?page=2">Next</a></li></ol>"#;
        assert_eq!(
            next_page_url(html, BASE),
            Some("https://archiveofourown.org/users/x/readings?page=2".to_string())
        );
        assert_eq!(next_page_url("<p></p>", BASE), None);
    }
}
