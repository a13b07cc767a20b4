//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次导入的整体调度和批量写入。
//!
//! ## 模块划分
//!
//! ### `import_pipeline` - 导入流水线
//! - 账号级互斥，清理过期会话
//! - 调用 ScrapeFlow 抓取，读取导出文件
//! - 提取、合并，交给 BatchLoader 写入
//! - 汇总成 ImportReport
//!
//! ### `batch_loader` - 批量写入器
//! - 按固定大小分批
//! - 控制并发写入的批次数（Semaphore）
//! - 单批被拒绝只记录，存储不可达整体中止
//!
//! ## 层次关系
//!
//! ```text
//! import_pipeline (处理一次导入)
//!     ↓
//! workflow::ScrapeFlow (处理一个账号的实时抓取)   batch_loader (处理 Vec<Entry>)
//!     ↓                                               ↓
//! services (能力层：auth / extractor / reconciler / store)
//!     ↓
//! infrastructure (基础设施：JsExecutor / HttpSession)
//! ```

pub mod batch_loader;
pub mod import_pipeline;

pub use batch_loader::BatchLoader;
pub use import_pipeline::{ImportPipeline, ImportRequest};
