use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_test::assert_ok;

use ao3_library_sync::config::Config;
use ao3_library_sync::models::{ExportFile, ImportOutcome, Origin, ReadingStatus, WorkRecord};
use ao3_library_sync::services::reconcile;
use ao3_library_sync::services::store::{LibraryStore, MemoryStore};
use ao3_library_sync::utils::logging;
use ao3_library_sync::{ImportPipeline, ImportRequest, ReconciledLibraryEntry, StoreError};

fn bookmark_block(id: &str, title: &str, author: Option<&str>) -> String {
    let author_link = author
        .map(|a| format!(r#" by <a rel="author" href="/users/{a}/pseuds/{a}">{a}</a>"#))
        .unwrap_or_default();
    format!(
        r#"<li class="bookmark blurb group">
             <div class="header module">
               <h4 class="heading"><a href="/works/{id}">{title}</a>{author_link}</h4>
             </div>
             <dl class="stats"><dt>Words:</dt><dd>1,000</dd><dt>Chapters:</dt><dd>1/?</dd></dl>
           </li>"#
    )
}

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn offline_request(exports: Vec<ExportFile>) -> ImportRequest {
    ImportRequest {
        owner_id: "owner-1".to_string(),
        identity: None,
        secret: None,
        exports,
    }
}

#[tokio::test]
async fn test_offline_import_merges_sources_and_isolates_parse_errors() {
    let dir = tempfile::tempdir().unwrap();

    let bookmarks = format!(
        "<html><body><ol>{}{}{}</ol></body></html>",
        bookmark_block("1", "One", Some("alice")),
        bookmark_block("2", "Two", Some("bob")),
        bookmark_block("3", "Three", None),
    );
    let bookmarks_path = write_file(dir.path(), "bookmarks.html", &bookmarks);
    let history_path = write_file(
        dir.path(),
        "history.json",
        r#"{"history":[{"id":"55","title":"T","fandom":"F","words":"1,500"},{"id":"1","title":"One","author":"alice"}]}"#,
    );
    let marked_path = write_file(dir.path(), "marked.json", "{not json");

    let store = Arc::new(MemoryStore::new());
    let pipeline = assert_ok!(ImportPipeline::new(Config::default(), store.clone()));
    let report = pipeline
        .run(offline_request(vec![
            ExportFile {
                origin: Origin::BookmarksExport,
                path: bookmarks_path,
            },
            ExportFile {
                origin: Origin::HistoryExport,
                path: history_path,
            },
            ExportFile {
                origin: Origin::MarkedForLaterExport,
                path: marked_path,
            },
        ]))
        .await;

    assert_eq!(report.count_for(Origin::BookmarksExport), 2);
    assert_eq!(report.count_for(Origin::HistoryExport), 2);
    assert!(report.sources[2].error.is_some());
    assert!(matches!(report.outcome, ImportOutcome::PartiallyFailed(_)));
    assert_eq!(report.unique_works, 3);
    assert_eq!(report.persisted_count, 3);

    let fifty_five = store.get("owner-1", "55").await.unwrap();
    assert_eq!(fifty_five.work.word_count, 1500);
    assert_eq!(fifty_five.work.fandoms, vec!["F"]);
    assert_eq!(fifty_five.resolved_status, ReadingStatus::Completed);

    let one = store.get("owner-1", "1").await.unwrap();
    assert_eq!(one.resolved_status, ReadingStatus::Completed);
    assert!(one.sources.contains(&Origin::BookmarksExport));
    assert!(one.sources.contains(&Origin::HistoryExport));
}

#[tokio::test]
async fn test_missing_export_file_fails_only_when_nothing_else_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = assert_ok!(ImportPipeline::new(Config::default(), store.clone()));

    let report = pipeline
        .run(offline_request(vec![ExportFile {
            origin: Origin::HistoryExport,
            path: dir.path().join("missing.json"),
        }]))
        .await;

    assert!(matches!(report.outcome, ImportOutcome::Failed(_)));
    assert!(!report.is_success());
    assert!(store.is_empty().await);
}

/// 第一次写入时拒绝整批的存储
struct FlakyStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

#[async_trait]
impl LibraryStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_batch(&self, owner: &str, entries: &[ReconciledLibraryEntry]) -> Result<usize, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::BatchRejected("duplicate key value violates unique constraint".into()));
        }
        self.inner.upsert_batch(owner, entries).await
    }
}

#[tokio::test]
async fn test_one_rejected_batch_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let entries: Vec<String> = (1..=130)
        .map(|i| format!(r#"{{"id":"{}","title":"Work {}","author":"a"}}"#, i, i))
        .collect();
    let history_path = write_file(dir.path(), "history.json", &format!("[{}]", entries.join(",")));

    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        calls: AtomicUsize::new(0),
    });
    let config = Config {
        batch_size: 50,
        max_concurrent_batches: 1,
        ..Config::default()
    };
    let pipeline = assert_ok!(ImportPipeline::new(config, store.clone()));

    let report = pipeline
        .run(offline_request(vec![ExportFile {
            origin: Origin::HistoryExport,
            path: history_path,
        }]))
        .await;

    let load = report.load.as_ref().unwrap();
    assert_eq!(load.attempted_batches, 3);
    assert_eq!(load.rejected_batches.len(), 1);
    assert_eq!(load.accepted_count, 80);
    assert_eq!(report.persisted_count, 80);
    assert_eq!(store.inner.len().await, 80);
    assert_eq!(
        report.outcome,
        ImportOutcome::PartiallyFailed("1/3 个批次写入失败".to_string())
    );
}

#[test]
fn test_higher_status_wins_across_sources() {
    let to_read = WorkRecord::new("9", Origin::MarkedForLaterExport).with_status(ReadingStatus::ToRead);
    let reading = WorkRecord::new("9", Origin::LiveScrape).with_status(ReadingStatus::Reading);

    let entries = reconcile(vec![to_read.clone(), reading.clone()]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resolved_status, ReadingStatus::Reading);

    let reversed = reconcile(vec![reading, to_read]);
    assert_eq!(reversed[0].resolved_status, ReadingStatus::Reading);
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_live_import() {
    // 初始化日志
    logging::init();

    // 加载配置（需要 AO3_USERNAME / AO3_PASSWORD）
    let config = Config::load().expect("加载配置失败");
    let store = Arc::new(MemoryStore::new());
    let request = ImportRequest::from_config(&config);

    let pipeline = ImportPipeline::new(config, store).expect("初始化导入流水线失败");
    let report = pipeline.run(request).await;

    logging::print_final_report(&report);
    assert!(report.is_success(), "导入应该成功");
}
