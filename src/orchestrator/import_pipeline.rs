//! 导入流水线 - 编排层
//!
//! ## 职责
//!
//! 一次导入的完整调度：抓取 → 读取导出文件 → 提取 → 合并 → 分批写入 → 报告。
//!
//! ## 核心功能
//!
//! 1. **账号互斥**：同一账号的导入串行执行
//! 2. **来源隔离**：某个导出文件读取或解析失败，只记录在该来源的报告中
//! 3. **兜底数据**：只有配置允许时才写入书库
//! 4. **结果判定**：成功 / 部分失败 / 失败，附带原因

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ImportError};
use crate::models::{
    export_files_from_config, load_export_files, ExportFile, ImportOutcome, ImportReport, LoadReport, Origin,
    ScrapeOutcome, SourceReport, WorkRecord,
};
use crate::orchestrator::batch_loader::BatchLoader;
use crate::services::auth::{IdentityLocks, SessionRegistry};
use crate::services::extractor::WorkExtractor;
use crate::services::reconciler::reconcile;
use crate::services::store::LibraryStore;
use crate::utils::logging::log_import_start;
use crate::workflow::{ImportCtx, ScrapeFlow};

/// 一次导入请求
#[derive(Clone, Default)]
pub struct ImportRequest {
    pub owner_id: String,
    pub identity: Option<String>,
    pub secret: Option<String>,
    pub exports: Vec<ExportFile>,
}

impl ImportRequest {
    /// 从配置中读取账号和导出文件路径
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner_id: config.owner_id.clone(),
            identity: config.identity.clone(),
            secret: config.secret.clone(),
            exports: export_files_from_config(config),
        }
    }

    /// 账号和密码都提供时才进行实时抓取
    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.identity.as_deref(), self.secret.as_deref()) {
            (Some(identity), Some(secret)) if !identity.trim().is_empty() => Some((identity, secret)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ImportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRequest")
            .field("owner_id", &self.owner_id)
            .field("identity", &self.identity)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("exports", &self.exports)
            .finish()
    }
}

/// 导入流水线
pub struct ImportPipeline {
    config: Config,
    store: Arc<dyn LibraryStore>,
    scrape: ScrapeFlow,
    registry: Arc<SessionRegistry>,
    locks: Arc<IdentityLocks>,
    extractor: WorkExtractor,
    cancel: CancellationToken,
}

impl ImportPipeline {
    /// 按配置创建
    pub fn new(config: Config, store: Arc<dyn LibraryStore>) -> AppResult<Self> {
        let scrape = ScrapeFlow::new(&config)?;
        Ok(Self::with_scrape_flow(config, store, scrape))
    }

    /// 使用指定的抓取流程创建
    pub fn with_scrape_flow(config: Config, store: Arc<dyn LibraryStore>, scrape: ScrapeFlow) -> Self {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(config.session_ttl_secs)));
        let extractor = WorkExtractor::new(config.archive_base_url.clone());
        Self {
            config,
            store,
            scrape,
            registry,
            locks: Arc::new(IdentityLocks::new()),
            extractor,
            cancel: CancellationToken::new(),
        }
    }

    /// 与其他流水线共享会话登记表
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// 与其他流水线共享账号锁
    pub fn with_locks(mut self, locks: Arc<IdentityLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// 取消信号，取消后在批次之间停止写入
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 执行一次导入
    ///
    /// # 参数
    /// - `request`: 导入请求
    ///
    /// # 返回
    /// 导入报告；所有失败都体现在 `outcome` 和各来源的 `error` 中
    pub async fn run(&self, request: ImportRequest) -> ImportReport {
        self.registry.sweep_expired().await;

        let ctx = ImportCtx::new(request.owner_id.clone(), request.identity.clone());
        let _guard = match request.identity.as_deref() {
            Some(identity) => Some(self.locks.acquire(identity).await),
            None => None,
        };

        log_import_start(ctx.identity_label(), self.config.batch_size, self.config.max_concurrent_batches);

        let mut sources = Vec::new();
        let mut records: Vec<WorkRecord> = Vec::new();

        // ========== 1. 实时抓取 ==========
        let scrape = match request.credentials() {
            Some((identity, secret)) => self.scrape.run(&ctx, identity, secret).await,
            None => ScrapeOutcome::NotRequested,
        };
        self.collect_scrape(&scrape, &mut sources, &mut records);

        // ========== 2. 导出文件 ==========
        for loaded in load_export_files(&request.exports).await {
            let extracted = loaded
                .content
                .and_then(|text| {
                    self.extractor
                        .extract(loaded.origin, &text)
                        .map(|stream| stream.collect::<Vec<_>>())
                        .map_err(|e| e.to_string())
                });

            match extracted {
                Ok(found) => {
                    info!("{} 📄 {}: {} 条", ctx, loaded.origin, found.len());
                    sources.push(SourceReport {
                        origin: loaded.origin,
                        record_count: found.len(),
                        error: None,
                    });
                    records.extend(found);
                }
                Err(e) => {
                    warn!("{} ⚠️ {} 处理失败，跳过: {}", ctx, loaded.origin, e);
                    sources.push(SourceReport {
                        origin: loaded.origin,
                        record_count: 0,
                        error: Some(e),
                    });
                }
            }
        }

        // ========== 3. 合并 ==========
        let entries = reconcile(records);
        let unique_works = entries.len();
        info!("{} 🔗 合并后共 {} 部作品", ctx, unique_works);

        // ========== 4. 写入 ==========
        let source_errors: Vec<String> = sources
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {}", s.origin, e)))
            .collect();

        let (load, outcome) = if entries.is_empty() {
            (None, empty_outcome(&sources, &source_errors))
        } else {
            let loader = BatchLoader::from_config(&self.config, self.cancel.clone());
            match loader.load(self.store.clone(), &request.owner_id, entries).await {
                Ok(load) => {
                    let outcome = load_outcome(&load, &source_errors);
                    (Some(load), outcome)
                }
                Err(e) => (None, ImportOutcome::Failed(e.to_string())),
            }
        };

        let persisted_count = load.as_ref().map(|l| l.accepted_count).unwrap_or(0);

        // ========== 5. 登记会话 ==========
        let session_id = match (&scrape, request.identity.as_deref()) {
            (ScrapeOutcome::AuthenticatedData(_), Some(identity)) => Some(self.registry.register(identity).await),
            _ => None,
        };

        info!("{} 🏁 导入结束: {}", ctx, outcome);
        ImportReport {
            identity: ctx.identity_label().to_string(),
            sources,
            scrape,
            unique_works,
            persisted_count,
            load,
            outcome,
            session_id,
        }
    }

    /// 把抓取结果计入来源统计；兜底数据只有配置允许时才参与写入
    fn collect_scrape(&self, scrape: &ScrapeOutcome, sources: &mut Vec<SourceReport>, records: &mut Vec<WorkRecord>) {
        match scrape {
            ScrapeOutcome::NotRequested => {}
            ScrapeOutcome::AuthenticatedData(found) => {
                sources.push(SourceReport {
                    origin: Origin::LiveScrape,
                    record_count: found.len(),
                    error: None,
                });
                records.extend(found.iter().cloned());
            }
            ScrapeOutcome::PublicFallbackData { reason, records: found, .. } => {
                if self.config.persist_fallback_data {
                    sources.push(SourceReport {
                        origin: Origin::LiveScrape,
                        record_count: found.len(),
                        error: None,
                    });
                    records.extend(found.iter().cloned());
                } else {
                    info!("兜底数据 {} 条不写入书库", found.len());
                    sources.push(SourceReport {
                        origin: Origin::LiveScrape,
                        record_count: 0,
                        error: Some(format!("仅获得兜底数据，未写入 ({})", reason)),
                    });
                }
            }
            ScrapeOutcome::NoDataAvailable { reason } => {
                sources.push(SourceReport {
                    origin: Origin::LiveScrape,
                    record_count: 0,
                    error: Some(reason.clone()),
                });
            }
        }
    }
}

/// 没有任何条目时的结果
fn empty_outcome(sources: &[SourceReport], source_errors: &[String]) -> ImportOutcome {
    if sources.is_empty() {
        return ImportOutcome::Failed(ImportError::NothingToImport("未提供账号或导出文件".to_string()).to_string());
    }
    if source_errors.len() == sources.len() {
        return ImportOutcome::Failed(ImportError::NothingToImport(source_errors.join("; ")).to_string());
    }
    if source_errors.is_empty() {
        ImportOutcome::Succeeded
    } else {
        ImportOutcome::PartiallyFailed(source_errors.join("; "))
    }
}

/// 写入完成后的结果
fn load_outcome(load: &LoadReport, source_errors: &[String]) -> ImportOutcome {
    if !load.rejected_batches.is_empty() {
        let err = ImportError::PartialImport {
            failed: load.rejected_batches.len(),
            total: load.attempted_batches,
        };
        // 一条都没写进去时不算部分成功
        if load.accepted_count == 0 {
            return ImportOutcome::Failed(err.to_string());
        }
        return ImportOutcome::PartiallyFailed(err.to_string());
    }
    if load.cancelled {
        return ImportOutcome::PartiallyFailed(format!("导入已取消，已写入 {} 条", load.accepted_count));
    }
    if !source_errors.is_empty() {
        return ImportOutcome::PartiallyFailed(source_errors.join("; "));
    }
    ImportOutcome::Succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::FetchedPage;
    use crate::error::AuthError;
    use crate::models::{AuthSession, RejectedBatch, SessionToken};
    use crate::services::auth::{ArchiveSession, AuthSessionManager, Authenticator, PageFetcher};
    use crate::services::store::MemoryStore;
    use async_trait::async_trait;

    const READINGS: &str = r#"<ol class="reading work index group">
        <li class="work blurb group"><div class="header module"><h4 class="heading"><a href="/works/7">Seven</a> by <a rel="author" href="/users/a/pseuds/a">a</a></h4></div></li>
    </ol>"#;

    /// 所有地址都返回同一页面
    struct StaticFetcher(String);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError> {
            Ok(FetchedPage {
                final_url: url.to_string(),
                status: Some(200),
                html: self.0.clone(),
            })
        }

        async fn release(&mut self) {}
    }

    struct OfflineFetcher;

    #[async_trait]
    impl PageFetcher for OfflineFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, AuthError> {
            Err(AuthError::Network(format!("offline: {}", url)))
        }

        async fn release(&mut self) {}
    }

    struct StaticAuthenticator {
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for StaticAuthenticator {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn login(&self, identity: &str, _secret: &str) -> Result<ArchiveSession, AuthError> {
            if self.fail {
                return Err(AuthError::InvalidCredentials("bad".into()));
            }
            Ok(ArchiveSession::new(
                AuthSession::new(identity, SessionToken::Authenticated),
                Box::new(StaticFetcher(READINGS.to_string())),
                "https://archiveofourown.org/users/logout".to_string(),
            ))
        }
    }

    fn pipeline(config: Config, fail_login: bool, store: Arc<MemoryStore>) -> ImportPipeline {
        let auth = AuthSessionManager::with_authenticators(vec![Arc::new(StaticAuthenticator { fail: fail_login })], 1);
        let scrape = ScrapeFlow::with_parts(config.clone(), auth, Arc::new(OfflineFetcher));
        ImportPipeline::with_scrape_flow(config, store, scrape)
    }

    fn request(identity: Option<&str>) -> ImportRequest {
        ImportRequest {
            owner_id: "owner-1".into(),
            identity: identity.map(str::to_string),
            secret: identity.map(|_| "pw".to_string()),
            exports: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_nothing_requested_fails() {
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(Config::default(), false, store).run(request(None)).await;

        assert!(matches!(report.scrape, ScrapeOutcome::NotRequested));
        assert!(matches!(report.outcome, ImportOutcome::Failed(_)));
        assert!(report.load.is_none());
    }

    #[tokio::test]
    async fn test_authenticated_scrape_is_persisted_and_registered() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(Config::default(), false, store.clone());
        let report = pipeline.run(request(Some("reader"))).await;

        assert_eq!(report.outcome, ImportOutcome::Succeeded);
        // 三个列表返回同一页面，合并后只剩一部
        assert_eq!(report.unique_works, 1);
        assert_eq!(report.persisted_count, 1);
        assert_eq!(store.len().await, 1);

        let session_id = report.session_id.expect("session registered");
        assert_eq!(pipeline.registry().lookup(&session_id).await.as_deref(), Some("reader"));
        // 导入结束后账号锁被清理
        assert!(pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_login_without_fallback_fails_import() {
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(Config::default(), true, store.clone()).run(request(Some("reader"))).await;

        assert!(matches!(report.scrape, ScrapeOutcome::NoDataAvailable { .. }));
        assert!(matches!(report.outcome, ImportOutcome::Failed(_)));
        assert!(report.session_id.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sample_fallback_is_not_persisted_by_default() {
        let config = Config {
            allow_sample_fallback: true,
            ..Config::default()
        };
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(config, true, store.clone()).run(request(Some("reader"))).await;

        assert!(report.scrape.is_fallback());
        assert_eq!(report.persisted_count, 0);
        assert!(store.is_empty().await);
        assert!(report.sources[0].error.is_some());
    }

    #[tokio::test]
    async fn test_sample_fallback_persisted_when_configured() {
        let config = Config {
            allow_sample_fallback: true,
            persist_fallback_data: true,
            ..Config::default()
        };
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(config, true, store.clone()).run(request(Some("reader"))).await;

        assert_eq!(report.outcome, ImportOutcome::Succeeded);
        assert_eq!(report.persisted_count, 2);
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn test_load_outcome_reports_partial_import() {
        let load = LoadReport {
            attempted_batches: 3,
            accepted_count: 80,
            rejected_batches: vec![RejectedBatch {
                index: 0,
                size: 50,
                reason: "constraint".into(),
            }],
            cancelled: false,
        };
        assert_eq!(
            load_outcome(&load, &[]),
            ImportOutcome::PartiallyFailed("1/3 个批次写入失败".to_string())
        );
        assert_eq!(load_outcome(&LoadReport::default(), &[]), ImportOutcome::Succeeded);
    }

    #[test]
    fn test_every_batch_rejected_is_failure() {
        let rejected = |index| RejectedBatch {
            index,
            size: 50,
            reason: "constraint".into(),
        };
        let load = LoadReport {
            attempted_batches: 2,
            accepted_count: 0,
            rejected_batches: vec![rejected(0), rejected(1)],
            cancelled: false,
        };
        assert_eq!(
            load_outcome(&load, &[]),
            ImportOutcome::Failed("2/2 个批次写入失败".to_string())
        );
    }

    #[test]
    fn test_request_debug_hides_secret() {
        let text = format!("{:?}", request(Some("reader")));
        assert!(text.contains("***"));
        assert!(!text.contains("\"pw\""));
    }
}
