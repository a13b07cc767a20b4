//! 书库存储
//!
//! 存储只需要一个"按键 upsert"的契约：键为 (owner, external_id)，
//! 键冲突时后写入的覆盖先写入的。

pub mod memory;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StoreKind};
use crate::error::StoreError;
use crate::models::ReconciledLibraryEntry;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// 书库存储契约
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// 存储名称，用于日志
    fn name(&self) -> &'static str;

    /// 加载前检查存储是否可达
    async fn health_check(&self) -> Result<(), StoreError>;

    /// 批量 upsert 一组条目
    ///
    /// # 返回
    /// - `Ok(n)`: 写入的条目数
    /// - `Err(StoreError::BatchRejected)`: 本批次违反约束，整批未写入
    /// - `Err(StoreError::Unavailable)`: 存储不可达
    async fn upsert_batch(
        &self,
        owner: &str,
        entries: &[ReconciledLibraryEntry],
    ) -> Result<usize, StoreError>;
}

/// 根据配置创建存储
pub fn build_store(config: &Config) -> anyhow::Result<Arc<dyn LibraryStore>> {
    match config.store_kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::Rest => Ok(Arc::new(RestStore::from_config(config)?)),
    }
}
