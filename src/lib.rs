//! # AO3 Library Sync
//!
//! 把 AO3 账号的阅读记录（实时抓取 + 离线导出文件）导入个人书库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供导航、eval、读取 Cookie 的能力
//! - `HttpSession` - reqwest 客户端 + 手工维护的 Cookie
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个模块只处理一件事
//! - `auth` - 登录（浏览器 / HTTP）、登录结果判定、会话登记
//! - `extractor` - 把列表页、书签导出、JSON 导出统一成 `WorkRecord`
//! - `reconciler` - 按作品 ID 合并多个来源的记录
//! - `store` - 书库存储契约（内存 / REST）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个账号"的实时抓取流程
//! - `ImportCtx` - 上下文封装（import_id + owner + 账号）
//! - `ScrapeFlow` - 登录 → 抓取列表 → 兜底链
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/import_pipeline` - 一次导入的完整调度
//! - `orchestrator/batch_loader` - 分批并发写入
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, AuthError, ImportError, ParseError, StoreError};
pub use models::{ImportOutcome, ImportReport, Origin, ReadingStatus, ReconciledLibraryEntry, ScrapeOutcome, WorkRecord};
pub use orchestrator::{BatchLoader, ImportPipeline, ImportRequest};
pub use services::{build_store, LibraryStore, MemoryStore, WorkExtractor};
pub use workflow::{ImportCtx, ScrapeFlow};
