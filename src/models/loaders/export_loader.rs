use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::config::Config;
use crate::models::work::Origin;

/// 一个待读取的导出文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub origin: Origin,
    pub path: PathBuf,
}

/// 读取后的导出文件；读取失败时 `content` 为错误描述
#[derive(Debug)]
pub struct LoadedExport {
    pub origin: Origin,
    pub path: PathBuf,
    pub content: Result<String, String>,
}

/// 根据配置列出要读取的导出文件
pub fn export_files_from_config(config: &Config) -> Vec<ExportFile> {
    [
        (Origin::BookmarksExport, &config.bookmarks_file),
        (Origin::HistoryExport, &config.history_file),
        (Origin::MarkedForLaterExport, &config.marked_for_later_file),
    ]
    .into_iter()
    .filter_map(|(origin, path)| {
        path.as_ref().map(|p| ExportFile {
            origin,
            path: PathBuf::from(p),
        })
    })
    .collect()
}

/// 读取单个导出文件，并检查扩展名与来源是否匹配
pub async fn load_export_file(file: &ExportFile) -> Result<String> {
    let expected: &[&str] = match file.origin {
        Origin::BookmarksExport => &["html", "htm"],
        Origin::HistoryExport | Origin::MarkedForLaterExport => &["json"],
        Origin::LiveScrape => anyhow::bail!("实时抓取没有导出文件"),
    };

    if !has_extension(&file.path, expected) {
        anyhow::bail!(
            "{} 的文件格式不正确，应为 {}: {}",
            file.origin,
            expected.join("/"),
            file.path.display()
        );
    }

    fs::read_to_string(&file.path)
        .await
        .with_context(|| format!("无法读取导出文件: {}", file.path.display()))
}

/// 逐个读取导出文件，单个文件失败不影响其他文件
pub async fn load_export_files(files: &[ExportFile]) -> Vec<LoadedExport> {
    let mut loaded = Vec::with_capacity(files.len());

    for file in files {
        tracing::info!(
            "正在加载 {}: {}",
            file.origin,
            file.path.file_name().unwrap_or_default().to_string_lossy()
        );

        let content = match load_export_file(file).await {
            Ok(content) => {
                tracing::info!("成功读取 {} 字节", content.len());
                Ok(content)
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", file.path.display(), e);
                Err(format!("{:#}", e))
            }
        };

        loaded.push(LoadedExport {
            origin: file.origin,
            path: file.path.clone(),
            content,
        });
    }

    loaded
}

fn has_extension(path: &Path, expected: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| expected.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
