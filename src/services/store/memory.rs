use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LibraryStore;
use crate::error::StoreError;
use crate::models::ReconciledLibraryEntry;

/// 进程内存储
///
/// 键为 (owner, external_id)，后写入覆盖先写入。供离线导入和测试使用。
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<(String, String), ReconciledLibraryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn get(&self, owner: &str, external_id: &str) -> Option<ReconciledLibraryEntry> {
        self.rows
            .read()
            .await
            .get(&(owner.to_string(), external_id.to_string()))
            .cloned()
    }

    /// 某个用户的全部条目，按作品 ID 排序
    pub async fn entries_for(&self, owner: &str) -> Vec<ReconciledLibraryEntry> {
        let rows = self.rows.read().await;
        let mut entries: Vec<_> = rows
            .iter()
            .filter(|((row_owner, _), _)| row_owner == owner)
            .map(|(_, entry)| entry.clone())
            .collect();
        entries.sort_by(|a, b| a.external_id().cmp(b.external_id()));
        entries
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_batch(
        &self,
        owner: &str,
        entries: &[ReconciledLibraryEntry],
    ) -> Result<usize, StoreError> {
        if let Some(entry) = entries.iter().find(|e| e.external_id().is_empty()) {
            return Err(StoreError::BatchRejected(format!(
                "条目缺少作品 ID: {}",
                entry.work.title
            )));
        }

        let mut rows = self.rows.write().await;
        for entry in entries {
            rows.insert((owner.to_string(), entry.external_id().to_string()), entry.clone());
        }
        Ok(entries.len())
    }
}
