//! 批量写入器 - 编排层
//!
//! ## 职责
//!
//! 把合并后的书库条目分批 upsert 到存储，批次之间互相隔离。
//!
//! ## 核心功能
//!
//! 1. **健康检查**：写入前确认存储可达，不可达则整体中止
//! 2. **分批**：按固定大小切分（默认 50 条），每个作品只会出现在一个批次中
//! 3. **并发控制**：使用 Semaphore 限制同时写入的批次数
//! 4. **失败隔离**：单批被拒绝只记录并跳过，不影响其他批次
//! 5. **取消**：只在批次之间检查取消信号，不打断正在写入的批次

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ImportError, StoreError};
use crate::models::{LoadReport, ReconciledLibraryEntry, RejectedBatch};
use crate::services::store::LibraryStore;
use crate::utils::logging::{log_batch_complete, log_batch_start};

/// 批量写入器
#[derive(Debug, Clone)]
pub struct BatchLoader {
    batch_size: usize,
    max_concurrent: usize,
    cancel: CancellationToken,
}

/// 单个批次的执行结果
#[derive(Debug)]
struct BatchOutcome {
    index: usize,
    size: usize,
    result: Result<usize, StoreError>,
}

impl BatchLoader {
    pub fn new(batch_size: usize, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
            cancel,
        }
    }

    pub fn from_config(config: &Config, cancel: CancellationToken) -> Self {
        Self::new(config.batch_size, config.max_concurrent_batches, cancel)
    }

    /// 批次总数
    pub fn batch_count(&self, entries: usize) -> usize {
        entries.div_ceil(self.batch_size)
    }

    /// 写入所有条目
    ///
    /// # 参数
    /// - `store`: 目标存储
    /// - `owner`: 书库所有者
    /// - `entries`: 已去重的条目
    ///
    /// # 返回
    /// - `Ok(LoadReport)`: 各批次的接受 / 拒绝情况
    /// - `Err(ImportError::StoreUnavailable)`: 存储不可达，剩余批次全部放弃
    pub async fn load(
        &self,
        store: Arc<dyn LibraryStore>,
        owner: &str,
        entries: Vec<ReconciledLibraryEntry>,
    ) -> Result<LoadReport, ImportError> {
        let mut report = LoadReport::default();
        if entries.is_empty() {
            return Ok(report);
        }

        store.health_check().await.map_err(|e| {
            error!("❌ 存储 {} 不可用: {}", store.name(), e);
            ImportError::StoreUnavailable(e.to_string())
        })?;

        let total = entries.len();
        let batches: Vec<Vec<ReconciledLibraryEntry>> =
            entries.chunks(self.batch_size).map(|c| c.to_vec()).collect();
        let total_batches = batches.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        // 每一轮最多 max_concurrent 个批次，一轮结束后再开始下一轮
        let mut pending = batches.into_iter().enumerate().peekable();
        while pending.peek().is_some() {
            let mut handles = Vec::new();

            for _ in 0..self.max_concurrent {
                if self.cancel.is_cancelled() {
                    break;
                }
                let Some((index, batch)) = pending.next() else {
                    break;
                };

                let start = index * self.batch_size;
                log_batch_start(index + 1, total_batches, start + 1, start + batch.len(), total);

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| ImportError::StoreUnavailable(e.to_string()))?;
                let store = store.clone();
                let owner = owner.to_string();

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    let size = batch.len();
                    let result = store.upsert_batch(&owner, &batch).await;
                    BatchOutcome { index, size, result }
                });
                handles.push(handle);
            }

            let mut unavailable: Option<StoreError> = None;
            for handle in handles {
                report.attempted_batches += 1;
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("批次任务执行失败: {}", e);
                        unavailable.get_or_insert(StoreError::Unavailable(e.to_string()));
                        continue;
                    }
                };

                match outcome.result {
                    Ok(accepted) => {
                        report.accepted_count += accepted;
                        log_batch_complete(outcome.index + 1, accepted, outcome.size);
                    }
                    Err(StoreError::BatchRejected(reason)) => {
                        warn!("⚠️ 第 {} 批被拒绝，跳过: {}", outcome.index + 1, reason);
                        report.rejected_batches.push(RejectedBatch {
                            index: outcome.index,
                            size: outcome.size,
                            reason,
                        });
                    }
                    Err(e @ StoreError::Unavailable(_)) => {
                        error!("❌ 第 {} 批写入时存储不可用: {}", outcome.index + 1, e);
                        unavailable.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = unavailable {
                return Err(ImportError::StoreUnavailable(e.to_string()));
            }

            if self.cancel.is_cancelled() && pending.peek().is_some() {
                warn!("⚠️ 导入已取消，剩余批次不再写入");
                report.cancelled = true;
                break;
            }
        }

        info!(
            "📦 写入完成: {} 批，接受 {} 条，拒绝 {} 批",
            report.attempted_batches,
            report.accepted_count,
            report.rejected_batches.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, WorkRecord};
    use crate::services::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entries(n: usize) -> Vec<ReconciledLibraryEntry> {
        (0..n)
            .map(|i| ReconciledLibraryEntry::from_record(WorkRecord::new(i.to_string(), Origin::HistoryExport)))
            .collect()
    }

    /// 第 `reject_call` 次调用拒绝整批的存储
    struct RejectingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
        reject_call: usize,
        unavailable: bool,
    }

    #[async_trait]
    impl LibraryStore for RejectingStore {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn health_check(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_batch(&self, owner: &str, entries: &[ReconciledLibraryEntry]) -> Result<usize, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.reject_call {
                if self.unavailable {
                    return Err(StoreError::Unavailable("connection refused".into()));
                }
                return Err(StoreError::BatchRejected("constraint violation".into()));
            }
            self.inner.upsert_batch(owner, entries).await
        }
    }

    struct DownStore;

    #[async_trait]
    impl LibraryStore for DownStore {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn health_check(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("no route to host".into()))
        }

        async fn upsert_batch(&self, _: &str, _: &[ReconciledLibraryEntry]) -> Result<usize, StoreError> {
            unreachable!("health check fails first")
        }
    }

    #[tokio::test]
    async fn test_all_batches_accepted() {
        let store = Arc::new(MemoryStore::new());
        let loader = BatchLoader::new(50, 2, CancellationToken::new());

        let report = loader.load(store.clone(), "owner", entries(120)).await.unwrap();
        assert_eq!(report.attempted_batches, 3);
        assert_eq!(report.accepted_count, 120);
        assert!(report.rejected_batches.is_empty());
        assert_eq!(store.len().await, 120);
    }

    #[tokio::test]
    async fn test_one_rejected_batch_is_isolated() {
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
            reject_call: 0,
            unavailable: false,
        });
        // 串行写入，保证第一次调用就是第一批
        let loader = BatchLoader::new(50, 1, CancellationToken::new());

        let report = loader.load(store.clone(), "owner", entries(130)).await.unwrap();
        assert_eq!(report.attempted_batches, 3);
        assert_eq!(report.rejected_batches.len(), 1);
        assert_eq!(report.rejected_batches[0].size, 50);
        assert_eq!(report.accepted_count, 80);
        assert_eq!(store.inner.len().await, 80);
    }

    #[tokio::test]
    async fn test_unavailable_aborts_load() {
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
            reject_call: 1,
            unavailable: true,
        });
        let loader = BatchLoader::new(10, 1, CancellationToken::new());

        let result = loader.load(store.clone(), "owner", entries(50)).await;
        assert!(matches!(result, Err(ImportError::StoreUnavailable(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_health_check_aborts_before_writing() {
        let loader = BatchLoader::new(50, 2, CancellationToken::new());
        let result = loader.load(Arc::new(DownStore), "owner", entries(3)).await;
        assert!(matches!(result, Err(ImportError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let store = Arc::new(MemoryStore::new());
        let loader = BatchLoader::new(50, 2, cancel);

        let report = loader.load(store.clone(), "owner", entries(10)).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempted_batches, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let loader = BatchLoader::new(50, 2, CancellationToken::new());
        let report = loader.load(Arc::new(DownStore), "owner", Vec::new()).await.unwrap();
        assert_eq!(report, LoadReport::default());
        assert_eq!(loader.batch_count(101), 3);
    }
}
