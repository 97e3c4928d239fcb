//! Taleforge - 故事生成工作流客户端
//!
//! 用法:
//! - `taleforge`            检查后端健康状态
//! - `taleforge "<创意>"`   生成故事并生成场景资源

use std::sync::Arc;

use taleforge::application::{GenerationOrchestrator, StoryApi, WorkflowStage};
use taleforge::config::{load_config, print_config, LogConfig};
use taleforge::domain::GenerationSettings;
use taleforge::infrastructure::adapters::ReqwestTransport;

fn init_tracing(log: &LogConfig) {
    let log_filter = format!("{},taleforge={}", log.level, log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config.log);
    tracing::info!("Taleforge - 故事生成工作流客户端");
    print_config(&config);

    let transport = Arc::new(ReqwestTransport::new(config.backend.transport_config())?);
    let api = StoryApi::with_config(transport, config.backend.api_config());
    let orchestrator = GenerationOrchestrator::with_api(api, config.workflow.clone());

    orchestrator
        .check_health()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let idea = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if idea.trim().is_empty() {
        return Ok(());
    }

    // 工作流事件写入日志
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                tracing::debug!(event = %line, "Workflow event");
            }
        }
    });

    let settings = GenerationSettings::new(idea);
    orchestrator.submit_story(&settings).await?;
    let snapshot = orchestrator.wait_until_settled().await;
    if snapshot.stage != WorkflowStage::PreviewReady {
        let message = snapshot
            .failure
            .map(|f| f.message())
            .unwrap_or_else(|| format!("workflow stopped while {}", snapshot.stage));
        anyhow::bail!(message);
    }

    orchestrator.refine_story("").await?;
    orchestrator.confirm_assets().await?;
    let snapshot = orchestrator.wait_until_settled().await;

    let Some(story) = snapshot.story else {
        let message = snapshot
            .failure
            .map(|f| f.message())
            .unwrap_or_else(|| format!("workflow stopped while {}", snapshot.stage));
        anyhow::bail!(message);
    };

    tracing::info!(
        story_id = %story.id(),
        title = %story.title(),
        scenes = story.scene_count(),
        words = story.word_count(),
        "Story ready"
    );
    println!("{}", serde_json::to_string_pretty(&story)?);

    Ok(())
}
