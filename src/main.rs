use anyhow::{Context, Result};
use tracing::{error, info};

use ao3_library_sync::models::ImportOutcome;
use ao3_library_sync::utils::logging;
use ao3_library_sync::{build_store, Config, ImportPipeline, ImportRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load().context("加载配置失败")?;
    info!("配置: {:?}", config);

    let store = build_store(&config).context("创建书库存储失败")?;
    let request = ImportRequest::from_config(&config);
    let pipeline = ImportPipeline::new(config, store).context("初始化导入流水线失败")?;

    // Ctrl-C 时在批次之间停止写入
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到中断信号，当前批次完成后停止");
            cancel.cancel();
        }
    });

    let report = pipeline.run(request).await;
    logging::print_final_report(&report);

    if let ImportOutcome::Failed(reason) = &report.outcome {
        error!("❌ 导入失败: {}", reason);
        std::process::exit(1);
    }

    Ok(())
}
