//! 实时抓取流程 - 流程层
//!
//! 核心职责：定义"一个账号"的实时抓取流程
//!
//! 流程顺序：
//! 1. 登录 → 抓取阅读历史 / 书签 / 稍后阅读列表（逐页翻页）
//! 2. 登录失败或列表全部抓取失败 → 公开作品列表前 N 部
//! 3. 公开列表也拿不到 → 内置示例数据（需显式开启）
//! 4. 都没有 → `NoDataAvailable`
//!
//! 每一步的结果都带标签返回，调用方可以区分真实数据和兜底数据。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AuthError;
use crate::models::{sample::sample_works, FallbackSource, Origin, ReadingStatus, ScrapeOutcome, WorkRecord};
use crate::services::auth::{anonymous_fetcher, is_login_url, ArchiveSession, AuthSessionManager, PageFetcher};
use crate::services::extractor::{next_page_url, WorkExtractor};
use crate::utils::truncate_text;
use crate::workflow::import_ctx::ImportCtx;

/// 需要抓取的个人列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Readings,
    Bookmarks,
    MarkedForLater,
}

impl Listing {
    const ALL: [Listing; 3] = [Listing::Readings, Listing::Bookmarks, Listing::MarkedForLater];

    fn path(self, identity: &str) -> String {
        match self {
            Listing::Readings => format!("/users/{}/readings", identity),
            Listing::Bookmarks => format!("/users/{}/bookmarks", identity),
            Listing::MarkedForLater => format!("/users/{}/readings?show=to-read", identity),
        }
    }

    fn status(self) -> ReadingStatus {
        match self {
            Listing::Readings => ReadingStatus::Completed,
            Listing::Bookmarks => ReadingStatus::WantToRead,
            Listing::MarkedForLater => ReadingStatus::ToRead,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Listing::Readings => "阅读历史",
            Listing::Bookmarks => "书签",
            Listing::MarkedForLater => "稍后阅读",
        }
    }
}

/// 单个列表的抓取结果
enum ListingResult {
    Records(Vec<WorkRecord>),
    /// 跳转到登录页，视为未公开
    Private,
}

/// 实时抓取流程
///
/// - 不直接持有浏览器，登录后的资源由 `ArchiveSession` 持有并在流程结束时释放
/// - 公开列表兜底使用匿名 HTTP 会话
pub struct ScrapeFlow {
    config: Config,
    auth: AuthSessionManager,
    public: Arc<dyn PageFetcher>,
    extractor: WorkExtractor,
}

impl ScrapeFlow {
    /// 按配置创建（登录方式由 `auth_mode` 决定）
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        let public: Arc<dyn PageFetcher> = Arc::new(anonymous_fetcher(config)?);
        Ok(Self::with_parts(config.clone(), AuthSessionManager::new(config), public))
    }

    /// 使用指定的登录管理器和匿名抓取器创建
    pub fn with_parts(config: Config, auth: AuthSessionManager, public: Arc<dyn PageFetcher>) -> Self {
        let extractor = WorkExtractor::new(config.archive_base_url.clone());
        Self {
            config,
            auth,
            public,
            extractor,
        }
    }

    /// 执行一次实时抓取
    ///
    /// # 参数
    /// - `ctx`: 导入上下文（只用于日志）
    /// - `identity`: 站点账号
    /// - `secret`: 密码
    ///
    /// # 返回
    /// 带标签的抓取结果，不会返回错误；失败原因写在兜底结果的 `reason` 里
    pub async fn run(&self, ctx: &ImportCtx, identity: &str, secret: &str) -> ScrapeOutcome {
        info!("{} 🌐 开始实时抓取", ctx);

        let session = match self.auth.authenticate(identity, secret).await {
            Ok(session) => session,
            Err(e) => {
                warn!("{} ⚠️ 登录失败: {}", ctx, e);
                return self.fallback(ctx, format!("登录失败: {}", e)).await;
            }
        };

        info!("{} ✅ 登录成功，开始抓取个人列表", ctx);
        let result = self.scrape_library(ctx, &session).await;
        session.close().await;

        match result {
            Ok(records) => {
                info!("{} ✅ 实时抓取完成，共 {} 条记录", ctx, records.len());
                ScrapeOutcome::AuthenticatedData(records)
            }
            Err(reason) => {
                warn!("{} ⚠️ 个人列表抓取失败: {}", ctx, reason);
                self.fallback(ctx, reason).await
            }
        }
    }

    /// 抓取三个个人列表；全部失败时返回失败原因
    async fn scrape_library(&self, ctx: &ImportCtx, session: &ArchiveSession) -> Result<Vec<WorkRecord>, String> {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for listing in Listing::ALL {
            let url = self.config.archive_url(&listing.path(session.identity()));
            match self.scrape_listing(session, &url, listing.status()).await {
                Ok(ListingResult::Records(found)) => {
                    info!("{} 📚 {}: {} 条", ctx, listing.label(), found.len());
                    records.extend(found);
                }
                Ok(ListingResult::Private) => {
                    info!("{} 🔒 {} 未公开，跳过", ctx, listing.label());
                }
                Err(e) => {
                    warn!("{} ⚠️ {} 抓取失败: {}", ctx, listing.label(), e);
                    failures.push(format!("{}: {}", listing.label(), e));
                }
            }
        }

        if failures.len() == Listing::ALL.len() {
            return Err(failures.join("; "));
        }
        Ok(records)
    }

    /// 逐页抓取一个列表，最多 `max_scrape_pages` 页
    async fn scrape_listing(
        &self,
        session: &ArchiveSession,
        url: &str,
        status: ReadingStatus,
    ) -> Result<ListingResult, AuthError> {
        let mut records = Vec::new();
        let mut next = Some(url.to_string());
        let mut page_count = 0;

        while let Some(page_url) = next.take() {
            if page_count >= self.config.max_scrape_pages {
                break;
            }
            page_count += 1;

            let page = session.fetch(&page_url).await?;
            if is_login_url(&page.final_url) {
                if page_count == 1 {
                    return Ok(ListingResult::Private);
                }
                break;
            }

            let found = self.extract_page(&page.html, Some(status));
            debug!("第 {} 页: {} 条", page_count, found.len());
            if found.is_empty() {
                break;
            }
            self.log_records(&found);
            records.extend(found);
            next = next_page_url(&page.html, &self.config.archive_base_url);
        }

        Ok(ListingResult::Records(records))
    }

    /// 详细日志模式下列出每部作品
    fn log_records(&self, records: &[WorkRecord]) {
        if !self.config.verbose_logging {
            return;
        }
        for record in records {
            info!("  · #{} {} ({})", record.external_id, truncate_text(&record.title, 40), record.observed_status);
        }
    }

    fn extract_page(&self, html: &str, status: Option<ReadingStatus>) -> Vec<WorkRecord> {
        match self.extractor.extract_with(Origin::LiveScrape, html, status) {
            Ok(stream) => stream.collect(),
            Err(e) => {
                warn!("列表页解析失败: {}", e);
                Vec::new()
            }
        }
    }

    /// 兜底链：公开作品列表 → 内置示例 → 无数据
    async fn fallback(&self, ctx: &ImportCtx, reason: String) -> ScrapeOutcome {
        match self.public_listing().await {
            Ok(records) if !records.is_empty() => {
                info!("{} 🔄 使用公开作品列表兜底: {} 条", ctx, records.len());
                return ScrapeOutcome::PublicFallbackData {
                    source: FallbackSource::PublicListing,
                    reason,
                    records,
                };
            }
            Ok(_) => debug!("{} 公开作品列表为空", ctx),
            Err(e) => warn!("{} ⚠️ 公开作品列表抓取失败: {}", ctx, e),
        }

        if self.config.allow_sample_fallback {
            let records = sample_works(&self.config.archive_base_url);
            info!("{} 🔄 使用内置示例数据兜底: {} 条", ctx, records.len());
            return ScrapeOutcome::PublicFallbackData {
                source: FallbackSource::BuiltInSample,
                reason,
                records,
            };
        }

        warn!("{} ❌ 没有可用数据", ctx);
        ScrapeOutcome::NoDataAvailable { reason }
    }

    /// 公开作品列表的前 N 部
    async fn public_listing(&self) -> Result<Vec<WorkRecord>, AuthError> {
        let page = self.public.fetch(&self.config.archive_url("/works")).await?;
        let mut records = self.extract_page(&page.html, None);
        records.truncate(self.config.public_fallback_limit);
        Ok(records)
    }
}
