//! 统一的字段规范化规则，与来源无关

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static CHAPTERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d[\d,]*)\s*/\s*(\d[\d,]*|\?)").expect("valid chapters regex"));

static WORK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/works/(\d+)").expect("valid work id regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// 数字部分：允许千位分隔符
const NUMBER: &str = r"(\d{1,3}(?:,\d{3})+|\d+)";

/// 解析 "当前/总数" 形式的章节，总数为 `?` 时返回 `None`（不是 0）
///
/// 只有一个数字时视为当前章节数，总数未知；无法解析时为 `(0, None)`
pub fn parse_chapters(text: &str) -> (u32, Option<u32>) {
    if let Some(caps) = CHAPTERS_RE.captures(text) {
        let current = to_u32(parse_count(&caps[1]));
        let total = match &caps[2] {
            "?" => None,
            raw => Some(to_u32(parse_count(raw))),
        };
        return (current, total);
    }

    let trimmed = text.trim();
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return (to_u32(parse_count(trimmed)), None);
    }
    (0, None)
}

/// 解析开头的整数，容忍千位分隔符，失败返回 0
///
/// `"1,234 kudos"` → 1234，`"abc"` → 0
pub fn parse_count(text: &str) -> u64 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// 统计行中认识的标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatLabel {
    Words,
    Kudos,
    Hits,
    Bookmarks,
    Comments,
}

impl StatLabel {
    fn from_match(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "words" => Some(StatLabel::Words),
            "kudos" => Some(StatLabel::Kudos),
            "hits" => Some(StatLabel::Hits),
            "bookmarks" => Some(StatLabel::Bookmarks),
            "comments" => Some(StatLabel::Comments),
            _ => None,
        }
    }
}

const STAT_LABELS: &str = "(words|kudos|hits|bookmarks|comments)";

/// `Words: 1,234`：第 1 组为标签，第 2 组为数字
static LABEL_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){}\s*:\s*{}", STAT_LABELS, NUMBER)).expect("valid label-first regex")
});

/// `1,234 words`：第 1 组为数字，第 2 组为标签
static NUMBER_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){}\s*{}\b", NUMBER, STAT_LABELS)).expect("valid number-first regex")
});

/// 从统计行的自由文本中读出带标签的数字，找不到时为 0
///
/// 同时支持 `"Words: 1,234"` 和 `"1,234 words"` 两种写法，优先前者，
/// 避免 `"Comments:5Kudos:100"` 这样粘连的文本把 5 当作 kudos
pub fn parse_labeled_number(text: &str, label: StatLabel) -> u64 {
    let find = |re: &Regex, label_group: usize, number_group: usize| {
        re.captures_iter(text)
            .find(|caps| StatLabel::from_match(&caps[label_group]) == Some(label))
            .map(|caps| parse_count(&caps[number_group]))
    };

    find(&*LABEL_FIRST_RE, 1, 2)
        .or_else(|| find(&*NUMBER_FIRST_RE, 2, 1))
        .unwrap_or(0)
}

/// 从作品链接中取出作品 ID
pub fn work_id_from_href(href: &str) -> Option<String> {
    WORK_ID_RE.captures(href).map(|caps| caps[1].to_string())
}

/// 合并多余空白并去掉首尾空白
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// 站内相对链接补全为绝对链接
pub fn absolute_url(base_url: &str, href: &str) -> String {
    if href.is_empty() || href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href)
    }
}

/// 作品的规范链接
pub fn work_url(base_url: &str, external_id: &str) -> String {
    format!("{}/works/{}", base_url.trim_end_matches('/'), external_id)
}

/// 宽松的日期解析：RFC 3339、`2024-01-31 08:00:00`、`2024-01-31`、`31 Jan 2024`
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// 小于该值的数字时间戳按秒处理（约为 1973 年的毫秒值、5138 年的秒值）
const SECONDS_THRESHOLD: i64 = 100_000_000_000;

/// 数字时间戳，按量级区分秒和毫秒
pub fn datetime_from_timestamp(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() < SECONDS_THRESHOLD {
        Utc.timestamp_opt(value, 0).single()
    } else {
        Utc.timestamp_millis_opt(value).single()
    }
}

fn to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
