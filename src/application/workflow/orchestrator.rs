//! Generation Orchestrator - 故事生成工作流编排
//!
//! 独占当前的预览故事、最终故事与生成任务，按状态机推进:
//! 提交 → (轮询) → 预览 → 修改 → 资源生成 → (轮询) → 完成
//!
//! 状态修改都在短临界区内完成，锁从不跨越 await。
//! 每个在途操作持有一个 CancellationToken 和操作编号，
//! 被 cancel/reset 放弃的操作在提交结果前会发现自己已失效。

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::application::api::StoryApi;
use crate::application::error::{WorkflowError, WorkflowStep};
use crate::application::normalizer::{
    apply_assets, apply_refinement, classify, extract_image, normalize, AssetMergeDecoder,
    GeneratedStoryDecoder, ResultDecoder, Submission,
};
use crate::application::ports::TransportPort;
use crate::domain::{GenerationSettings, GenerationTask, Scene, Story, StoryError, TaskId, TaskStatus};
use crate::infrastructure::events::{WorkflowEvent, WorkflowEvents};
use crate::infrastructure::worker::{PollError, StatusPoller, StatusPollerConfig};

use super::config::WorkflowConfig;
use super::policy::ArtStylePolicy;
use super::state::{WorkflowFailure, WorkflowSnapshot, WorkflowStage};

/// 在途操作
struct InFlight {
    id: u64,
    step: WorkflowStep,
    token: CancellationToken,
}

/// 在途操作的凭据，提交结果前用来确认自己仍然有效
#[derive(Clone)]
struct Ticket {
    id: u64,
    step: WorkflowStep,
    token: CancellationToken,
}

#[derive(Default)]
struct WorkflowInner {
    stage: WorkflowStage,
    settings: Option<GenerationSettings>,
    preview: Option<Story>,
    story: Option<Story>,
    task: Option<GenerationTask>,
    failure: Option<WorkflowFailure>,
    refinement_settled: bool,
    /// 工作流实例编号，reset 时递增
    epoch: u64,
    in_flight: Option<InFlight>,
    next_op: u64,
}

/// 轮询的任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    Generation,
    Assets,
}

impl PollKind {
    fn step(self) -> WorkflowStep {
        match self {
            PollKind::Generation => WorkflowStep::PollGeneration,
            PollKind::Assets => WorkflowStep::PollAssets,
        }
    }

    /// 失败后 recover 回到的阶段；没有保留的预览时由 fail 改为 Idle
    fn resume_to(self) -> WorkflowStage {
        WorkflowStage::PreviewReady
    }
}

struct Core {
    api: StoryApi,
    poller: StatusPoller,
    config: WorkflowConfig,
    state: Mutex<WorkflowInner>,
    events: Arc<WorkflowEvents>,
    stage_tx: watch::Sender<WorkflowStage>,
}

impl Core {
    fn transition(&self, inner: &mut WorkflowInner, next: WorkflowStage) {
        let from = inner.stage;
        if from == next {
            return;
        }
        debug_assert!(
            from.can_transition_to(next),
            "illegal workflow transition {:?} -> {:?}",
            from,
            next
        );

        inner.stage = next;
        tracing::info!(from = %from, to = %next, epoch = inner.epoch, "Workflow stage changed");
        self.events.publish_stage_changed(from, next);
        self.stage_tx.send_replace(next);
    }

    /// 开始一个在途操作
    ///
    /// `prepare` 在锁内执行，返回操作需要的数据快照
    fn begin<T>(
        &self,
        operation: &'static str,
        step: WorkflowStep,
        allowed: &[WorkflowStage],
        next: WorkflowStage,
        prepare: impl FnOnce(&mut WorkflowInner) -> Result<T, WorkflowError>,
    ) -> Result<(Ticket, T), WorkflowError> {
        let mut inner = self.state.lock();
        if !allowed.contains(&inner.stage) || inner.in_flight.is_some() {
            tracing::debug!(operation, stage = %inner.stage, "Operation rejected in current stage");
            return Err(WorkflowError::invalid_state(operation, inner.stage));
        }

        let data = prepare(&mut *inner)?;

        inner.next_op += 1;
        let ticket = Ticket {
            id: inner.next_op,
            step,
            token: CancellationToken::new(),
        };
        inner.in_flight = Some(InFlight {
            id: ticket.id,
            step,
            token: ticket.token.clone(),
        });
        self.transition(&mut inner, next);

        Ok((ticket, data))
    }

    fn is_current(inner: &WorkflowInner, ticket: &Ticket) -> bool {
        !ticket.token.is_cancelled()
            && inner.in_flight.as_ref().map(|op| op.id) == Some(ticket.id)
    }

    /// 仅当操作仍然有效时修改状态
    fn commit<R>(
        &self,
        ticket: &Ticket,
        apply: impl FnOnce(&Self, &mut WorkflowInner) -> R,
    ) -> Result<R, WorkflowError> {
        let mut inner = self.state.lock();
        if !Self::is_current(&inner, ticket) {
            tracing::debug!(step = %ticket.step, op = ticket.id, "Stale operation result discarded");
            return Err(WorkflowError::Cancelled { step: ticket.step });
        }
        Ok(apply(self, &mut *inner))
    }

    /// 记录失败并进入 Failed；操作已失效时返回 Cancelled
    fn fail(&self, ticket: &Ticket, error: WorkflowError, resume_to: WorkflowStage) -> WorkflowError {
        let step = error.step().unwrap_or(ticket.step);
        let recorded = self.commit(ticket, |core, inner| {
            let resume_to = match resume_to {
                WorkflowStage::PreviewReady if inner.preview.is_none() => WorkflowStage::Idle,
                stage => stage,
            };
            inner.in_flight = None;
            inner.task = None;
            inner.failure = Some(WorkflowFailure {
                step,
                error: error.clone(),
                resume_to,
            });
            core.transition(inner, WorkflowStage::Failed);
        });

        match recorded {
            Ok(()) => {
                tracing::warn!(step = %step, error = %error, "Workflow step failed");
                self.events.publish_failed(step.as_str(), &error.user_message());
                error
            }
            Err(cancelled) => cancelled,
        }
    }

    fn finish_generation(&self, ticket: &Ticket, story: Story) -> Result<Story, WorkflowError> {
        self.commit(ticket, |core, inner| {
            inner.in_flight = None;
            inner.task = None;
            inner.failure = None;
            inner.refinement_settled = false;
            inner.preview = Some(story.clone());
            inner.story = None;
            core.transition(inner, WorkflowStage::PreviewReady);
        })?;

        tracing::info!(
            story_id = %story.id(),
            scenes = story.scene_count(),
            words = story.word_count(),
            "Preview story ready"
        );
        self.events.publish_preview_ready(story.id(), story.scene_count());
        Ok(story)
    }

    fn finish_assets(&self, ticket: &Ticket, story: Story) -> Result<Story, WorkflowError> {
        self.commit(ticket, |core, inner| {
            inner.in_flight = None;
            inner.task = None;
            inner.failure = None;
            inner.story = Some(story.clone());
            core.transition(inner, WorkflowStage::Complete);
        })?;

        tracing::info!(story_id = %story.id(), scenes = story.scene_count(), "Story complete");
        self.events.publish_story_complete(story.id(), story.scene_count());
        Ok(story)
    }

    /// 后端接受了异步任务：进入轮询阶段并启动轮询驱动
    fn start_polling(
        core: &Arc<Self>,
        ticket: Ticket,
        task: GenerationTask,
        decoder: Arc<dyn ResultDecoder>,
        kind: PollKind,
    ) -> Result<WorkflowStage, WorkflowError> {
        let next = match kind {
            PollKind::Generation => WorkflowStage::PollingGeneration,
            PollKind::Assets => WorkflowStage::PollingAssets,
        };
        let task_id = task.id.clone();

        core.commit(&ticket, |core, inner| {
            if let Some(op) = inner.in_flight.as_mut() {
                op.step = kind.step();
            }
            core.events.publish_task_progress(&task);
            inner.task = Some(task);
            core.transition(inner, next);
        })?;

        let ticket = Ticket {
            step: kind.step(),
            ..ticket
        };
        tokio::spawn(Self::drive_poll(core.clone(), ticket, task_id, decoder, kind));
        Ok(next)
    }

    async fn drive_poll(
        core: Arc<Self>,
        ticket: Ticket,
        task_id: TaskId,
        decoder: Arc<dyn ResultDecoder>,
        kind: PollKind,
    ) {
        let mut handle = core
            .poller
            .poll_with_token(task_id.clone(), decoder, ticket.token.child_token());

        while let Some(update) = handle.next().await {
            let task = match update {
                Ok(task) => task,
                Err(PollError::Transport(e)) => {
                    core.fail(&ticket, WorkflowError::transport(kind.step(), e), kind.resume_to());
                    return;
                }
                Err(PollError::BackendLogic(message)) => {
                    core.fail(
                        &ticket,
                        WorkflowError::backend_logic(kind.step(), message),
                        kind.resume_to(),
                    );
                    return;
                }
            };

            match task.status {
                TaskStatus::Pending | TaskStatus::Processing => {
                    let progressed = core.commit(&ticket, |core, inner| {
                        core.events.publish_task_progress(&task);
                        inner.task = Some(task);
                    });
                    if progressed.is_err() {
                        return;
                    }
                }
                TaskStatus::Completed => {
                    let Some(story) = task.result else {
                        core.fail(
                            &ticket,
                            WorkflowError::backend_logic(kind.step(), "task completed without a story"),
                            kind.resume_to(),
                        );
                        return;
                    };
                    let _ = match kind {
                        PollKind::Generation => core.finish_generation(&ticket, story),
                        PollKind::Assets => core.finish_assets(&ticket, story),
                    };
                    return;
                }
                TaskStatus::Failed => {
                    let message = task.error.unwrap_or_else(|| "Task failed".to_string());
                    core.fail(
                        &ticket,
                        WorkflowError::TaskFailed {
                            step: kind.step(),
                            message,
                        },
                        kind.resume_to(),
                    );
                    return;
                }
            }
        }

        tracing::debug!(task_id = %task_id, "Poll driver exited");
    }
}

/// 故事生成编排器
///
/// drop 时取消所有在途操作
pub struct GenerationOrchestrator {
    core: Arc<Core>,
}

impl GenerationOrchestrator {
    pub fn new(transport: Arc<dyn TransportPort>, config: WorkflowConfig) -> Self {
        Self::with_api(StoryApi::new(transport), config)
    }

    pub fn with_api(api: StoryApi, config: WorkflowConfig) -> Self {
        let poller = StatusPoller::new(
            api.clone(),
            StatusPollerConfig {
                interval: config.poll_interval(),
                ..Default::default()
            },
        );
        let (stage_tx, _) = watch::channel(WorkflowStage::Idle);

        tracing::info!(
            poll_interval_ms = config.poll_interval_ms,
            art_style_policy = ?config.art_style_policy,
            refinement_scope = ?config.refinement_scope,
            "GenerationOrchestrator initialized"
        );

        Self {
            core: Arc::new(Core {
                api,
                poller,
                config,
                state: Mutex::new(WorkflowInner::default()),
                events: WorkflowEvents::default().arc(),
                stage_tx,
            }),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.core.config
    }

    pub fn available_art_styles(&self) -> &[String] {
        &self.core.config.supported_art_styles
    }

    pub fn stage(&self) -> WorkflowStage {
        self.core.state.lock().stage
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.core.state.lock();
        WorkflowSnapshot {
            stage: inner.stage,
            settings: inner.settings.clone(),
            preview: inner.preview.clone(),
            story: inner.story.clone(),
            task: inner.task.clone(),
            failure: inner.failure.clone(),
            refinement_settled: inner.refinement_settled,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.core.events.subscribe()
    }

    /// 等待没有在途请求和轮询的阶段
    pub async fn wait_until_settled(&self) -> WorkflowSnapshot {
        let mut rx = self.core.stage_tx.subscribe();
        // 发送端由 core 持有，wait_for 只会在阶段满足时返回
        let _ = rx
            .wait_for(|stage| !stage.is_in_flight() && !stage.is_polling())
            .await;
        self.snapshot()
    }

    /// 后端健康检查，不影响工作流状态
    pub async fn check_health(&self) -> Result<(), WorkflowError> {
        match self.core.api.health().await {
            Ok(_) => {
                tracing::info!("Backend is healthy");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend health check failed");
                Err(WorkflowError::transport(WorkflowStep::HealthCheck, e))
            }
        }
    }

    /// 校验生成参数，返回编排器自己持有的快照
    fn validate_settings(&self, settings: &GenerationSettings) -> Result<GenerationSettings, WorkflowError> {
        let config = &self.core.config;

        if settings.idea().chars().count() < config.min_idea_chars {
            return Err(WorkflowError::validation(format!(
                "Story idea should be at least {} characters long",
                config.min_idea_chars
            )));
        }

        if settings.num_scenes < config.min_scenes || settings.num_scenes > config.max_scenes {
            return Err(WorkflowError::validation(format!(
                "Number of scenes must be between {} and {}",
                config.min_scenes, config.max_scenes
            )));
        }

        let mut snapshot = settings.clone();
        snapshot.story_idea = settings.idea().to_string();

        let style = settings.art_style.trim().to_lowercase();
        if config.supports_art_style(&style) {
            snapshot.art_style = style;
        } else {
            match config.art_style_policy {
                ArtStylePolicy::Reject => {
                    return Err(WorkflowError::validation(format!(
                        "Unsupported art style '{}'. Choose one of: {}",
                        settings.art_style,
                        config.supported_art_styles.join(", ")
                    )));
                }
                ArtStylePolicy::Substitute => {
                    tracing::warn!(
                        requested = %settings.art_style,
                        substitute = %config.default_art_style,
                        "Unsupported art style, using default"
                    );
                    snapshot.art_style = config.default_art_style.clone();
                }
            }
        }

        Ok(snapshot)
    }

    /// 提交故事创意
    ///
    /// 同步返回故事时进入 PreviewReady；返回任务令牌时进入 PollingGeneration。
    /// 已有的预览保留到新故事生成成功为止，失败后 recover 可以回到它
    pub async fn submit_story(&self, settings: &GenerationSettings) -> Result<WorkflowStage, WorkflowError> {
        let settings = self.validate_settings(settings)?;
        let core = &self.core;

        let (ticket, ()) = core.begin(
            "submit a story",
            WorkflowStep::Generate,
            &[WorkflowStage::Idle, WorkflowStage::Failed],
            WorkflowStage::Submitting,
            |inner| {
                inner.settings = Some(settings.clone());
                inner.task = None;
                inner.failure = None;
                Ok(())
            },
        )?;

        tracing::info!(
            num_scenes = settings.num_scenes,
            genre = %settings.genre,
            art_style = %settings.art_style,
            "Submitting story"
        );

        let response = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(WorkflowError::Cancelled { step: ticket.step }),
            response = core.api.generate(&settings) => response,
        };

        let raw = match response {
            Ok(raw) => raw,
            Err(e) => {
                return Err(core.fail(
                    &ticket,
                    WorkflowError::transport(WorkflowStep::Generate, e),
                    PollKind::Generation.resume_to(),
                ))
            }
        };

        match classify(&raw) {
            Submission::Task {
                task_id,
                estimated_time_secs,
            } => {
                tracing::info!(task_id = %task_id, estimated_time_secs = ?estimated_time_secs, "Generation task accepted");
                Core::start_polling(
                    core,
                    ticket,
                    GenerationTask::accepted(task_id, estimated_time_secs),
                    Arc::new(GeneratedStoryDecoder::new(settings)),
                    PollKind::Generation,
                )
            }
            Submission::Payload => {
                let story = normalize(&raw, usize::from(settings.num_scenes), &settings);
                let task = GenerationTask::completed_locally(story.clone());
                core.commit(&ticket, |core, _| core.events.publish_task_progress(&task))?;
                core.finish_generation(&ticket, story)?;
                Ok(WorkflowStage::PreviewReady)
            }
        }
    }

    /// 按提示修改预览故事
    ///
    /// 空提示表示跳过修改：不发请求，直接标记修改环节完成
    pub async fn refine_story(&self, prompt: &str) -> Result<Story, WorkflowError> {
        let prompt = prompt.trim();
        let core = &self.core;

        if prompt.is_empty() {
            let mut inner = core.state.lock();
            if inner.stage != WorkflowStage::PreviewReady {
                return Err(WorkflowError::invalid_state("refine the story", inner.stage));
            }
            let preview = inner
                .preview
                .clone()
                .ok_or_else(|| WorkflowError::invalid_state("refine the story", inner.stage))?;
            inner.refinement_settled = true;
            drop(inner);

            tracing::info!(story_id = %preview.id(), "Refinement skipped");
            core.events.publish_refinement_skipped();
            return Ok(preview);
        }

        let (ticket, preview) = core.begin(
            "refine the story",
            WorkflowStep::Refine,
            &[WorkflowStage::PreviewReady],
            WorkflowStage::Refining,
            |inner| {
                inner
                    .preview
                    .clone()
                    .ok_or_else(|| WorkflowError::invalid_state("refine the story", inner.stage))
            },
        )?;

        let response = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(WorkflowError::Cancelled { step: ticket.step }),
            response = core.api.refine(prompt, &preview) => response,
        };

        let refined = response
            .map_err(|e| WorkflowError::transport(WorkflowStep::Refine, e))
            .and_then(|raw| {
                apply_refinement(&preview, &raw, &core.config.refinement_policy())
                    .map_err(|message| WorkflowError::backend_logic(WorkflowStep::Refine, message))
            });

        let refined = match refined {
            Ok(story) => story,
            Err(e) => return Err(core.fail(&ticket, e, WorkflowStage::PreviewReady)),
        };

        core.commit(&ticket, |core, inner| {
            inner.in_flight = None;
            inner.preview = Some(refined.clone());
            inner.refinement_settled = true;
            core.transition(inner, WorkflowStage::PreviewReady);
        })?;

        tracing::info!(story_id = %refined.id(), scope = ?core.config.refinement_scope, "Story refined");
        core.events.publish_story_refined(refined.id());
        Ok(refined)
    }

    /// 确认预览并生成场景资源
    ///
    /// 同步返回资源时进入 Complete；返回任务令牌时进入 PollingAssets
    pub async fn confirm_assets(&self) -> Result<WorkflowStage, WorkflowError> {
        let core = &self.core;

        let (ticket, (preview, art_style)) = core.begin(
            "generate scene assets",
            WorkflowStep::GenerateAssets,
            &[WorkflowStage::PreviewReady],
            WorkflowStage::SubmittingAssets,
            |inner| {
                let preview = inner.preview.clone().ok_or_else(|| {
                    WorkflowError::invalid_state("generate scene assets", inner.stage)
                })?;
                // 预览可能来自更早的一次提交，画风以预览自身为准
                let art_style = preview.metadata().art_style.clone();
                Ok((preview, art_style))
            },
        )?;

        let response = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(WorkflowError::Cancelled { step: ticket.step }),
            response = core.api.generate_assets(&preview, &art_style) => response,
        };

        let raw = match response {
            Ok(raw) => raw,
            Err(e) => {
                return Err(core.fail(
                    &ticket,
                    WorkflowError::transport(WorkflowStep::GenerateAssets, e),
                    WorkflowStage::PreviewReady,
                ))
            }
        };

        match classify(&raw) {
            Submission::Task {
                task_id,
                estimated_time_secs,
            } => {
                tracing::info!(task_id = %task_id, "Asset task accepted");
                Core::start_polling(
                    core,
                    ticket,
                    GenerationTask::accepted(task_id, estimated_time_secs),
                    Arc::new(AssetMergeDecoder::new(preview)),
                    PollKind::Assets,
                )
            }
            Submission::Payload => match apply_assets(&preview, &raw) {
                Ok(story) => {
                    let task = GenerationTask::completed_locally(story.clone());
                    core.commit(&ticket, |core, _| core.events.publish_task_progress(&task))?;
                    core.finish_assets(&ticket, story)?;
                    Ok(WorkflowStage::Complete)
                }
                Err(message) => Err(core.fail(
                    &ticket,
                    WorkflowError::backend_logic(WorkflowStep::GenerateAssets, message),
                    WorkflowStage::PreviewReady,
                )),
            },
        }
    }

    /// 取消轮询
    ///
    /// 生成轮询回到 Idle，资源轮询回到 PreviewReady；不发出任何远程请求
    pub fn cancel(&self) -> Result<WorkflowStage, WorkflowError> {
        let core = &self.core;
        let mut inner = core.state.lock();

        let next = match inner.stage {
            WorkflowStage::PollingGeneration => WorkflowStage::Idle,
            WorkflowStage::PollingAssets => WorkflowStage::PreviewReady,
            stage => return Err(WorkflowError::invalid_state("cancel", stage)),
        };

        let step = inner.in_flight.take().map(|op| {
            op.token.cancel();
            op.step
        });
        let task_id = inner.task.take().map(|task| task.id);
        core.transition(&mut inner, next);
        drop(inner);

        let step = step.unwrap_or(WorkflowStep::PollGeneration);
        tracing::info!(task_id = ?task_id.as_ref().map(TaskId::as_str), step = %step, "Polling cancelled");
        core.events.publish_cancelled(step.as_str());
        Ok(next)
    }

    /// 放弃当前工作流实例并回到 Idle
    pub fn reset(&self) {
        let core = &self.core;
        let mut inner = core.state.lock();

        if let Some(op) = inner.in_flight.take() {
            op.token.cancel();
            tracing::debug!(step = %op.step, op = op.id, "In-flight operation abandoned");
        }
        inner.epoch += 1;
        inner.settings = None;
        inner.preview = None;
        inner.story = None;
        inner.task = None;
        inner.failure = None;
        inner.refinement_settled = false;
        core.transition(&mut inner, WorkflowStage::Idle);

        tracing::info!(epoch = inner.epoch, "Workflow reset");
    }

    /// 从失败中恢复到最近的稳定阶段，保留已有数据
    pub fn recover(&self) -> Result<WorkflowStage, WorkflowError> {
        let core = &self.core;
        let mut inner = core.state.lock();

        if inner.stage != WorkflowStage::Failed {
            return Err(WorkflowError::invalid_state("recover", inner.stage));
        }

        let wanted = inner
            .failure
            .as_ref()
            .map(|f| f.resume_to)
            .unwrap_or(WorkflowStage::Idle);
        let next = match wanted {
            WorkflowStage::Complete if inner.story.is_some() => WorkflowStage::Complete,
            WorkflowStage::PreviewReady if inner.preview.is_some() => WorkflowStage::PreviewReady,
            _ => WorkflowStage::Idle,
        };

        inner.failure = None;
        core.transition(&mut inner, next);
        Ok(next)
    }

    /// 编辑场景文本（仅 Complete）
    ///
    /// 本地先生效；开启同步时再写回后端，写回失败不会回滚本地修改
    pub async fn edit_scene(&self, scene_id: u32, text: &str) -> Result<Scene, WorkflowError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::validation("Scene text cannot be empty"));
        }

        let core = &self.core;
        let (scene, story_id) = {
            let mut inner = core.state.lock();
            if inner.stage != WorkflowStage::Complete {
                return Err(WorkflowError::invalid_state("edit a scene", inner.stage));
            }
            let stage = inner.stage;
            let story = inner
                .story
                .as_mut()
                .ok_or_else(|| WorkflowError::invalid_state("edit a scene", stage))?;
            story.update_scene_text(scene_id, text).map_err(scene_error)?;
            let scene = story
                .scene(scene_id)
                .cloned()
                .ok_or_else(|| scene_error(StoryError::SceneNotFound(scene_id)))?;
            (scene, story.id().clone())
        };

        tracing::info!(story_id = %story_id, scene_id, "Scene edited locally");

        if !core.config.sync_scene_edits || story_id.is_local() {
            core.events.publish_scene_updated(scene_id, false);
            return Ok(scene);
        }

        match core.api.update_scene(story_id.as_str(), scene_id, text).await {
            Ok(_) => {
                core.events.publish_scene_updated(scene_id, true);
                Ok(scene)
            }
            Err(e) => {
                tracing::warn!(story_id = %story_id, scene_id, error = %e, "Scene edit not synced");
                core.events.publish_scene_updated(scene_id, false);
                Err(WorkflowError::transport(WorkflowStep::EditScene, e))
            }
        }
    }

    /// 重新生成场景插图（仅 Complete）
    ///
    /// 提示词立即写入场景；成功后替换插图地址
    pub async fn regenerate_scene_image(
        &self,
        scene_id: u32,
        prompt: Option<&str>,
    ) -> Result<Scene, WorkflowError> {
        let core = &self.core;

        let (epoch, story_id, prompt, art_style) = {
            let mut inner = core.state.lock();
            if inner.stage != WorkflowStage::Complete {
                return Err(WorkflowError::invalid_state("regenerate an image", inner.stage));
            }
            let epoch = inner.epoch;
            let stage = inner.stage;
            let story = inner
                .story
                .as_mut()
                .ok_or_else(|| WorkflowError::invalid_state("regenerate an image", stage))?;
            let story_id = story.id().clone();
            let art_style = story.metadata().art_style.clone();

            let scene = story.scene_mut(scene_id).map_err(scene_error)?;
            let prompt = match prompt.map(str::trim).filter(|p| !p.is_empty()) {
                Some(prompt) => {
                    scene.set_image_prompt(prompt);
                    prompt.to_string()
                }
                None => scene.image_prompt().to_string(),
            };
            (epoch, story_id, prompt, art_style)
        };

        tracing::info!(story_id = %story_id, scene_id, "Regenerating scene image");

        let raw = core
            .api
            .regenerate_image(story_id.as_str(), scene_id, &prompt, &art_style)
            .await
            .map_err(|e| WorkflowError::transport(WorkflowStep::RegenerateImage, e))?;

        let image = extract_image(&raw).ok_or_else(|| {
            WorkflowError::backend_logic(WorkflowStep::RegenerateImage, "response carried no image")
        })?;

        let scene = {
            let mut inner = core.state.lock();
            if inner.epoch != epoch || inner.stage != WorkflowStage::Complete {
                return Err(WorkflowError::Cancelled {
                    step: WorkflowStep::RegenerateImage,
                });
            }
            let stage = inner.stage;
            let story = inner
                .story
                .as_mut()
                .ok_or_else(|| WorkflowError::invalid_state("regenerate an image", stage))?;
            let scene = story.scene_mut(scene_id).map_err(scene_error)?;
            scene.replace_image(image);
            scene.clone()
        };

        core.events.publish_scene_image_regenerated(scene_id);
        Ok(scene)
    }
}

fn scene_error(error: StoryError) -> WorkflowError {
    match error {
        StoryError::SceneNotFound(id) => WorkflowError::validation(format!("Scene {} does not exist", id)),
        other => WorkflowError::validation(other.to_string()),
    }
}

impl Drop for GenerationOrchestrator {
    fn drop(&mut self) {
        if let Some(op) = self.core.state.lock().in_flight.take() {
            op.token.cancel();
        }
    }
}
