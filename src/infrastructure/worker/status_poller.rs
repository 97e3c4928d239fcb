//! Status Poller - 后台任务状态轮询
//!
//! 立即发出第一次状态查询，之后按固定间隔查询，直到任务进入终态。
//! 每次查询都在循环内 await，请求之间不会重叠；错过的 tick 直接跳过。

use futures_util::Stream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::normalizer::{parse_status, ResultDecoder};
use crate::application::ports::TransportError;
use crate::application::StoryApi;
use crate::domain::{GenerationTask, TaskId, TaskStatus};

/// 轮询错误（发出后轮询即停止）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    BackendLogic(String),
}

/// 轮询产出的单条更新
pub type PollUpdate = Result<GenerationTask, PollError>;

/// Poller 配置
#[derive(Debug, Clone)]
pub struct StatusPollerConfig {
    /// 轮询间隔
    pub interval: Duration,
    /// 更新通道容量
    pub buffer: usize,
}

impl Default for StatusPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            buffer: 16,
        }
    }
}

/// 状态轮询器
#[derive(Clone)]
pub struct StatusPoller {
    api: StoryApi,
    config: StatusPollerConfig,
}

impl StatusPoller {
    pub fn new(api: StoryApi, config: StatusPollerConfig) -> Self {
        Self { api, config }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// 开始轮询
    pub fn poll(&self, task_id: TaskId, decoder: Arc<dyn ResultDecoder>) -> PollHandle {
        self.poll_with_token(task_id, decoder, CancellationToken::new())
    }

    /// 使用外部令牌开始轮询（令牌取消即停止）
    pub fn poll_with_token(
        &self,
        task_id: TaskId,
        decoder: Arc<dyn ResultDecoder>,
        token: CancellationToken,
    ) -> PollHandle {
        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));

        tracing::info!(
            task_id = %task_id,
            interval_ms = self.config.interval.as_millis() as u64,
            "Status polling started"
        );

        let join = tokio::spawn(run_poll_loop(
            self.api.clone(),
            task_id,
            self.config.interval,
            decoder,
            tx,
            token.clone(),
        ));

        PollHandle {
            rx,
            token,
            join: Some(join),
        }
    }
}

/// 轮询句柄
///
/// drop 时自动取消轮询
pub struct PollHandle {
    rx: mpsc::Receiver<PollUpdate>,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// 下一条更新；轮询结束或已取消时返回 None
    pub async fn next(&mut self) -> Option<PollUpdate> {
        if self.token.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            update = self.rx.recv() => update,
        }
    }

    /// 取消轮询，之后不会再交付任何更新
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 转换为更新流
    pub fn into_stream(self) -> impl Stream<Item = PollUpdate> {
        futures_util::stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|update| (update, handle))
        })
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn run_poll_loop(
    api: StoryApi,
    task_id: TaskId,
    interval: Duration,
    decoder: Arc<dyn ResultDecoder>,
    tx: mpsc::Sender<PollUpdate>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        attempt += 1;
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            response = api.status(&task_id) => response,
        };

        let update = match response {
            Ok(raw) => decode_update(&task_id, &raw, decoder.as_ref()),
            Err(e) => Err(PollError::Transport(e)),
        };

        let done = match &update {
            Ok(task) => {
                tracing::debug!(
                    task_id = %task_id,
                    attempt,
                    status = %task.status,
                    progress = task.progress,
                    "Status poll tick"
                );
                task.is_terminal()
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, attempt, error = %e, "Status poll failed");
                true
            }
        };

        if token.is_cancelled() {
            break;
        }

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            sent = tx.send(update) => sent.is_ok(),
        };

        if !sent || done {
            break;
        }
    }

    tracing::info!(task_id = %task_id, attempts = attempt, "Status polling stopped");
}

/// 把状态响应转换为任务快照；完成时解码结果
fn decode_update(
    task_id: &TaskId,
    raw: &serde_json::Value,
    decoder: &dyn ResultDecoder,
) -> PollUpdate {
    let report = parse_status(raw).map_err(PollError::BackendLogic)?;

    let mut task = GenerationTask {
        id: task_id.clone(),
        status: report.status,
        progress: report.progress,
        current_step: report.current_step,
        estimated_time_secs: None,
        result: None,
        error: report.error,
    };

    match report.status {
        TaskStatus::Completed => {
            let payload = report.story.ok_or_else(|| {
                PollError::BackendLogic("task completed without a result".to_string())
            })?;
            task.result = Some(decoder.decode(&payload).map_err(PollError::BackendLogic)?);
            task.progress = 100;
        }
        TaskStatus::Failed => {
            if task.error.is_none() {
                task.error = Some("Task failed".to_string());
            }
        }
        TaskStatus::Pending | TaskStatus::Processing => {}
    }

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::normalizer::GeneratedStoryDecoder;
    use crate::application::ports::HttpMethod;
    use crate::domain::GenerationSettings;
    use crate::infrastructure::adapters::{FakeReply, FakeTransport};
    use futures_util::StreamExt;
    use serde_json::json;

    const STATUS_PATH: &str = "/api/stories/status/t-1";

    fn poller(fake: Arc<FakeTransport>) -> StatusPoller {
        StatusPoller::new(
            StoryApi::new(fake),
            StatusPollerConfig {
                interval: Duration::from_millis(20),
                buffer: 4,
            },
        )
    }

    fn decoder() -> Arc<dyn ResultDecoder> {
        Arc::new(GeneratedStoryDecoder::new(
            GenerationSettings::new("A lighthouse keeper").with_num_scenes(3),
        ))
    }

    fn script(fake: &FakeTransport) {
        fake.on_json(HttpMethod::Get, STATUS_PATH, json!({"status": "pending", "progress": 10}))
            .on_json(HttpMethod::Get, STATUS_PATH, json!({"status": "processing", "progress": 60}))
            .on_json(
                HttpMethod::Get,
                STATUS_PATH,
                json!({"status": "completed", "story": {"scene_1": "X."}}),
            );
    }

    #[tokio::test]
    async fn test_three_updates_until_completed() {
        let fake = Arc::new(FakeTransport::new());
        script(&fake);

        let handle = poller(fake.clone()).poll(TaskId::from_backend("t-1"), decoder());
        let updates: Vec<PollUpdate> = handle.into_stream().collect().await;

        assert_eq!(updates.len(), 3);
        let tasks: Vec<&GenerationTask> = updates.iter().map(|u| u.as_ref().unwrap()).collect();
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].progress, 10);
        assert_eq!(tasks[1].progress, 60);
        assert_eq!(tasks[2].status, TaskStatus::Completed);
        assert_eq!(tasks[2].result.as_ref().unwrap().scenes()[0].text(), "X.");
        assert_eq!(fake.calls_to(STATUS_PATH), 3);
    }

    #[tokio::test]
    async fn test_no_updates_after_cancel() {
        let fake = Arc::new(FakeTransport::new());
        script(&fake);

        let mut handle = poller(fake.clone()).poll(TaskId::from_backend("t-1"), decoder());
        let first = handle.next().await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Pending);

        handle.cancel();
        assert!(handle.next().await.is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.next().await.is_none());
        assert!(fake.calls_to(STATUS_PATH) <= 2);
    }

    #[tokio::test]
    async fn test_failed_status_is_emitted_and_stops() {
        let fake = Arc::new(FakeTransport::new());
        fake.on_json(
            HttpMethod::Get,
            STATUS_PATH,
            json!({"status": "failed", "error": "model crashed"}),
        );

        let updates: Vec<PollUpdate> = poller(fake.clone())
            .poll(TaskId::from_backend("t-1"), decoder())
            .into_stream()
            .collect()
            .await;

        assert_eq!(updates.len(), 1);
        let task = updates[0].as_ref().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("model crashed"));
    }

    #[tokio::test]
    async fn test_transport_error_stops_polling() {
        let fake = Arc::new(FakeTransport::new());
        fake.on_json(HttpMethod::Get, STATUS_PATH, json!({"status": "processing"}))
            .on(HttpMethod::Get, STATUS_PATH, FakeReply::http_error(503, "unavailable"));

        let updates: Vec<PollUpdate> = poller(fake.clone())
            .poll(TaskId::from_backend("t-1"), decoder())
            .into_stream()
            .collect()
            .await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[1],
            Err(PollError::Transport(TransportError::Http { status: 503, .. }))
        ));
        assert_eq!(fake.calls_to(STATUS_PATH), 2);
    }

    #[tokio::test]
    async fn test_completed_without_story_is_backend_logic_error() {
        let fake = Arc::new(FakeTransport::new());
        fake.on_json(HttpMethod::Get, STATUS_PATH, json!({"status": "completed"}));

        let mut handle = poller(fake).poll(TaskId::from_backend("t-1"), decoder());
        assert!(matches!(handle.next().await, Some(Err(PollError::BackendLogic(_)))));
        assert!(handle.next().await.is_none());
    }
}
