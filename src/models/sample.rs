//! 内置示例数据
//!
//! 只在配置明确允许时作为最后一级兜底使用

use crate::models::work::{Origin, WorkRecord};

/// 两部示例作品
pub fn sample_works(base_url: &str) -> Vec<WorkRecord> {
    let base = base_url.trim_end_matches('/');

    let mut first = WorkRecord::new("12345", Origin::LiveScrape);
    first.title = "Sample Work 1".to_string();
    first.author = "Sample Author".to_string();
    first.fandoms = vec!["Sample Fandom".to_string()];
    first.relationships = vec!["Sample Relationship".to_string()];
    first.characters = vec!["Sample Character".to_string()];
    first.tags = vec!["sample".to_string(), "tag".to_string()];
    first.rating = "T".to_string();
    first.warnings = vec!["No Archive Warnings Apply".to_string()];
    first.categories = vec!["F/M".to_string()];
    first.chapters_current = 1;
    first.chapters_total = Some(1);
    first.word_count = 1000;
    first.summary = "A sample work for testing".to_string();
    first.kudos = 10;
    first.comment_count = 2;
    first.bookmark_count = 5;
    first.hits = 100;
    first.url = format!("{}/works/12345", base);

    let mut second = WorkRecord::new("67890", Origin::LiveScrape);
    second.title = "Sample Work 2".to_string();
    second.author = "Another Author".to_string();
    second.fandoms = vec!["Another Fandom".to_string()];
    second.relationships = vec!["Another Relationship".to_string()];
    second.characters = vec!["Another Character".to_string()];
    second.tags = vec!["another".to_string(), "tag".to_string()];
    second.rating = "G".to_string();
    second.warnings = vec!["No Archive Warnings Apply".to_string()];
    second.categories = vec!["Gen".to_string()];
    second.chapters_current = 3;
    second.chapters_total = Some(5);
    second.word_count = 5000;
    second.summary = "Another sample work for testing".to_string();
    second.kudos = 25;
    second.comment_count = 5;
    second.bookmark_count = 12;
    second.hits = 250;
    second.url = format!("{}/works/67890", base);

    vec![first, second]
}
