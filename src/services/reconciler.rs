//! 书库合并引擎
//!
//! 按作品 ID 折叠所有记录：优先级最高的记录提供描述字段，
//! 标签类列表取并集，来源记为集合，加入时间取最早。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{ReconciledLibraryEntry, WorkRecord};

/// 合并同一作品的多条记录
///
/// 输出中每个作品 ID 恰好出现一次，顺序为首次出现的顺序
pub fn reconcile<I>(records: I) -> Vec<ReconciledLibraryEntry>
where
    I: IntoIterator<Item = WorkRecord>,
{
    reconcile_entries(records.into_iter().map(ReconciledLibraryEntry::from_record))
}

/// 再次折叠已经合并过的条目
///
/// 对已去重的集合调用不会产生任何变化
pub fn reconcile_entries<I>(entries: I) -> Vec<ReconciledLibraryEntry>
where
    I: IntoIterator<Item = ReconciledLibraryEntry>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ReconciledLibraryEntry> = Vec::new();
    let mut input_count = 0usize;

    for entry in entries {
        input_count += 1;
        match index.get(entry.external_id()) {
            Some(&pos) => merge_into(&mut merged[pos], entry),
            None => {
                index.insert(entry.external_id().to_string(), merged.len());
                merged.push(entry);
            }
        }
    }

    debug!("合并 {} 条记录 → {} 部作品", input_count, merged.len());
    merged
}

/// 把 `incoming` 合并进 `kept`
///
/// 只有 `incoming` 的状态严格更高时才换用它的描述字段，同级保留先到的记录
pub fn merge_into(kept: &mut ReconciledLibraryEntry, incoming: ReconciledLibraryEntry) {
    let ReconciledLibraryEntry {
        work: incoming_work,
        resolved_status: incoming_status,
        sources: incoming_sources,
        date_added: incoming_added,
        ..
    } = incoming;

    let mut loser = if incoming_status.outranks(kept.resolved_status) {
        kept.resolved_status = incoming_status;
        let previous = std::mem::replace(&mut kept.work, incoming_work);

        // 列表保持首次出现的顺序：先到的记录在前
        let mut lists = previous.clone();
        union_lists(&mut lists, &kept.work);
        copy_lists(&mut kept.work, lists);
        previous
    } else {
        union_lists(&mut kept.work, &incoming_work);
        incoming_work
    };

    fill_missing(&mut kept.work, &mut loser);

    kept.sources.extend(incoming_sources);
    kept.date_added = earliest(kept.date_added, incoming_added);
    kept.refresh_progress();
}

/// 把 `other` 的列表字段并入 `target`，已有的值不重复
fn union_lists(target: &mut WorkRecord, other: &WorkRecord) {
    union_into(&mut target.fandoms, &other.fandoms);
    union_into(&mut target.relationships, &other.relationships);
    union_into(&mut target.characters, &other.characters);
    union_into(&mut target.tags, &other.tags);
    union_into(&mut target.warnings, &other.warnings);
    union_into(&mut target.categories, &other.categories);
}

fn copy_lists(target: &mut WorkRecord, from: WorkRecord) {
    target.fandoms = from.fandoms;
    target.relationships = from.relationships;
    target.characters = from.characters;
    target.tags = from.tags;
    target.warnings = from.warnings;
    target.categories = from.categories;
}

fn union_into(target: &mut Vec<String>, other: &[String]) {
    for value in other {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// 胜出记录缺失的字段由另一条记录补齐；访问次数取最大
fn fill_missing(winner: &mut WorkRecord, loser: &mut WorkRecord) {
    for (field, fallback) in [
        (&mut winner.title, &mut loser.title),
        (&mut winner.author, &mut loser.author),
        (&mut winner.author_url, &mut loser.author_url),
        (&mut winner.rating, &mut loser.rating),
        (&mut winner.summary, &mut loser.summary),
        (&mut winner.url, &mut loser.url),
    ] {
        if field.is_empty() {
            std::mem::swap(field, fallback);
        }
    }

    winner.published_at = winner.published_at.or(loser.published_at);
    winner.updated_at = winner.updated_at.or(loser.updated_at);
    winner.visited_at = earliest(winner.visited_at, loser.visited_at);
    winner.bookmarked_at = earliest(winner.bookmarked_at, loser.bookmarked_at);
    winner.marked_at = earliest(winner.marked_at, loser.marked_at);
    winner.visit_count = winner.visit_count.max(loser.visit_count);
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
