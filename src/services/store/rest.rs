//! PostgREST 风格的 REST 存储
//!
//! 每个批次一次 POST：`on_conflict=owner_id,external_id` 加上
//! `Prefer: resolution=merge-duplicates`，由服务端做按键 upsert。

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::LibraryStore;
use crate::config::Config;
use crate::error::StoreError;
use crate::models::ReconciledLibraryEntry;
use crate::utils::truncate_text;

/// 写入 REST 存储的一行
#[derive(Debug, Serialize)]
struct StoreRow<'a> {
    owner_id: &'a str,
    external_id: &'a str,
    title: &'a str,
    author: &'a str,
    author_url: &'a str,
    url: &'a str,
    fandoms: &'a [String],
    relationships: &'a [String],
    characters: &'a [String],
    tags: &'a [String],
    rating: &'a str,
    warnings: &'a [String],
    categories: &'a [String],
    word_count: u64,
    chapters_current: u32,
    chapters_total: Option<u32>,
    kudos: u64,
    hits: u64,
    bookmark_count: u64,
    comment_count: u64,
    summary: &'a str,
    published_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    status: &'static str,
    progress_percentage: u8,
    current_chapter: Option<u32>,
    sources: Vec<&'static str>,
    date_added: Option<DateTime<Utc>>,
    visited_at: Option<DateTime<Utc>>,
    visit_count: u32,
}

impl<'a> StoreRow<'a> {
    fn new(owner_id: &'a str, entry: &'a ReconciledLibraryEntry) -> Self {
        let work = &entry.work;
        Self {
            owner_id,
            external_id: &work.external_id,
            title: &work.title,
            author: &work.author,
            author_url: &work.author_url,
            url: &work.url,
            fandoms: &work.fandoms,
            relationships: &work.relationships,
            characters: &work.characters,
            tags: &work.tags,
            rating: &work.rating,
            warnings: &work.warnings,
            categories: &work.categories,
            word_count: work.word_count,
            chapters_current: work.chapters_current,
            chapters_total: work.chapters_total,
            kudos: work.kudos,
            hits: work.hits,
            bookmark_count: work.bookmark_count,
            comment_count: work.comment_count,
            summary: &work.summary,
            published_at: work.published_at,
            updated_at: work.updated_at,
            status: entry.resolved_status.as_str(),
            progress_percentage: entry.progress_percentage,
            current_chapter: entry.current_chapter,
            sources: entry.sources.iter().map(|o| o.as_str()).collect(),
            date_added: entry.date_added,
            visited_at: work.visited_at,
            visit_count: work.visit_count,
        }
    }
}

/// REST 存储客户端
pub struct RestStore {
    client: Client,
    table_url: String,
    api_key: String,
}

impl RestStore {
    /// # 参数
    /// - `base_url`: 服务根地址，表地址为 `{base_url}/rest/v1/{table}`
    pub fn new(base_url: &str, table: &str, api_key: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            anyhow::bail!("REST 存储地址未配置 (STORE_URL)");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.store_url, &config.store_table, &config.store_api_key)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
        }
    }
}

/// 按响应状态码分类
///
/// 4xx 表示这一批数据本身有问题（约束冲突、字段不合法），只拒绝本批；
/// 5xx 表示服务端不可用
pub(crate) fn classify_response(status: StatusCode, body: &str) -> Result<(), StoreError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(StoreError::BatchRejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_text(body, 200)
        )))
    } else {
        Err(StoreError::Unavailable(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_text(body, 200)
        )))
    }
}

#[async_trait]
impl LibraryStore for RestStore {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let request = self
            .client
            .get(&self.table_url)
            .query(&[("select", "external_id"), ("limit", "1")]);
        let response = self.authorized(request).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Unavailable(format!(
                "健康检查失败 HTTP {}: {}",
                status.as_u16(),
                truncate_text(&body, 200)
            )))
        }
    }

    async fn upsert_batch(
        &self,
        owner: &str,
        entries: &[ReconciledLibraryEntry],
    ) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let rows: Vec<StoreRow<'_>> = entries.iter().map(|e| StoreRow::new(owner, e)).collect();
        debug!("POST {} 行到 {}", rows.len(), self.table_url);

        let request = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "owner_id,external_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        let response = self.authorized(request).send().await?;

        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        if let Err(err) = classify_response(status, &body) {
            warn!("⚠️ 批次写入失败: {}", err);
            return Err(err);
        }
        Ok(entries.len())
    }
}
