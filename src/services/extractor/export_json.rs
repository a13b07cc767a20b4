//! 浏览器扩展导出的 JSON（阅读历史 / 稍后阅读）
//!
//! 不同版本的扩展导出格式不一致：顶层可能是数组，也可能是带命名字段的对象；
//! 每个条目的字段名和类型也各不相同。这里对每个字段做防御性转换，
//! 转换不了的字段取默认值，而不是让整个文件失败。

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::canonical::{
    clean_text, datetime_from_timestamp, parse_chapters, parse_count, parse_datetime, work_id_from_href,
    work_url,
};
use crate::error::ParseError;
use crate::models::{Origin, WorkRecord};

/// 解析 JSON 并取出条目数组
///
/// 语法错误返回 `InvalidJson`；结构无法识别返回 `UnexpectedShape`
pub fn entries_from_payload(payload: &str, origin: Origin) -> Result<Vec<Value>, ParseError> {
    let value: Value = serde_json::from_str(payload)?;

    match value {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => {
            for key in top_level_keys(origin) {
                match map.remove(*key) {
                    Some(Value::Array(entries)) => return Ok(entries),
                    Some(Value::Null) | None => continue,
                    Some(other) => {
                        return Err(ParseError::UnexpectedShape(format!(
                            "字段 \"{}\" 应为数组，实际为 {}",
                            key,
                            kind_of(&other)
                        )))
                    }
                }
            }
            Err(ParseError::UnexpectedShape(format!(
                "顶层对象缺少 {} 字段",
                top_level_keys(origin).join(" / ")
            )))
        }
        other => Err(ParseError::UnexpectedShape(format!(
            "顶层应为数组或对象，实际为 {}",
            kind_of(&other)
        ))),
    }
}

fn top_level_keys(origin: Origin) -> &'static [&'static str] {
    match origin {
        Origin::MarkedForLaterExport => &["marked_for_later", "works"],
        _ => &["history", "works"],
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 把单个条目转换为 `WorkRecord`
///
/// 条目不是对象、或者取不到作品 ID 时返回 `None`
pub fn normalize_entry(entry: &Value, origin: Origin, base_url: &str) -> Option<WorkRecord> {
    let obj = entry.as_object()?;

    let external_id = first_of(obj, &["id", "work_id"])
        .and_then(scalar_string)
        .or_else(|| obj.get("url").and_then(Value::as_str).and_then(work_id_from_href))?;
    if external_id.is_empty() {
        return None;
    }

    let mut record = WorkRecord::new(external_id, origin);

    record.title = text_field(obj, &["title"]);
    record.author = text_field(obj, &["author"]);
    if record.author.is_empty() {
        record.author = first_of(obj, &["authors"])
            .map(string_list)
            .unwrap_or_default()
            .join(", ");
    }
    record.author_url = text_field(obj, &["author_url"]);
    record.url = text_field(obj, &["url"]);
    if record.url.is_empty() {
        record.url = work_url(base_url, &record.external_id);
    }

    record.fandoms = list_field(obj, &["fandoms", "fandom"]);
    record.relationships = list_field(obj, &["relationships", "pairings"]);
    record.characters = list_field(obj, &["characters"]);
    record.tags = first_of(obj, &["additional_tags", "tags"])
        .map(tag_list)
        .unwrap_or_default();
    record.warnings = list_field(obj, &["warnings", "warning"]);
    record.categories = list_field(obj, &["categories", "category"]);
    record.rating = text_field(obj, &["rating"]);
    record.summary = text_field(obj, &["summary"]);

    record.word_count = number_field(obj, &["words", "word_count"]);
    record.kudos = number_field(obj, &["kudos"]);
    record.hits = number_field(obj, &["hits"]);
    record.bookmark_count = number_field(obj, &["bookmarks", "bookmark_count"]);
    record.comment_count = number_field(obj, &["comments", "comment_count"]);
    record.visit_count =
        u32::try_from(number_field(obj, &["visit_count", "visits"])).unwrap_or(u32::MAX);

    let (current, total) = match first_of(obj, &["chapters"]) {
        Some(Value::String(s)) => parse_chapters(s),
        Some(Value::Number(n)) => (n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0), None),
        _ => (0, None),
    };
    record.chapters_current = current;
    record.chapters_total = total;

    record.published_at = date_field(obj, &["published", "published_at", "date_published"]);
    record.updated_at = date_field(obj, &["updated", "updated_at", "date_updated"]);
    record.visited_at = date_field(obj, &["date_visited", "visited", "last_read"]);
    record.marked_at = date_field(obj, &["date_marked", "marked"]);
    record.bookmarked_at = date_field(obj, &["date_bookmarked", "bookmarked"]);

    Some(record)
}

/// 第一个存在且非空的字段
fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// 字符串或数字统一成字符串
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(clean_text(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("name").and_then(scalar_string),
        _ => None,
    }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    first_of(obj, keys).and_then(scalar_string).unwrap_or_default()
}

/// 字符串、字符串数组、带 `name` 的对象数组都转换成字符串列表
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_string)
            .filter(|s| !s.is_empty())
            .collect(),
        other => scalar_string(other)
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
    }
}

fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    first_of(obj, keys).map(string_list).unwrap_or_default()
}

/// 标签可能是扁平数组，也可能是按类别分组的对象（`{"freeforms": [{"name": ..}], ..}`），
/// 后者展开后取名称
fn tag_list(value: &Value) -> Vec<String> {
    match value {
        Value::Object(groups) => groups.values().flat_map(string_list).collect(),
        other => string_list(other),
    }
}

/// 数字或带千位分隔符的数字字符串，无法解析时为 0
fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> u64 {
    match first_of(obj, keys) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_count(s),
        _ => 0,
    }
}

/// 日期字符串或数字时间戳（秒或毫秒）
fn date_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    match first_of(obj, keys)? {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => n.as_i64().and_then(datetime_from_timestamp),
        _ => None,
    }
}
