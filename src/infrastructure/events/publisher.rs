//! Workflow Event Publisher
//!
//! 工作流进度事件的广播实现，订阅者（界面、日志）各自消费

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::workflow::WorkflowStage;
use crate::domain::{GenerationTask, StoryId};

/// 工作流事件类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum WorkflowEvent {
    /// 阶段变更
    StageChanged {
        from: WorkflowStage,
        to: WorkflowStage,
    },
    /// 任务进度
    TaskProgress {
        task_id: String,
        status: String,
        progress: u8,
        current_step: String,
    },
    /// 预览故事就绪
    PreviewReady {
        story_id: String,
        scene_count: usize,
    },
    /// 修改环节被跳过
    RefinementSkipped,
    /// 预览故事已修改
    StoryRefined { story_id: String },
    /// 资源生成完成
    StoryComplete {
        story_id: String,
        scene_count: usize,
    },
    /// 场景文本已编辑
    SceneUpdated {
        scene_id: u32,
        /// 是否已同步到后端
        synced: bool,
    },
    /// 场景插图已重新生成
    SceneImageRegenerated { scene_id: u32 },
    /// 步骤失败
    Failed { step: String, message: String },
    /// 步骤被取消
    Cancelled { step: String },
}

/// 事件发布器
pub struct WorkflowEvents {
    channel: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { channel: tx }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.channel.subscribe()
    }

    pub fn publish_stage_changed(&self, from: WorkflowStage, to: WorkflowStage) {
        self.publish(WorkflowEvent::StageChanged { from, to });
    }

    pub fn publish_task_progress(&self, task: &GenerationTask) {
        self.publish(WorkflowEvent::TaskProgress {
            task_id: task.id.to_string(),
            status: task.status.as_str().to_string(),
            progress: task.progress,
            current_step: task.current_step.clone(),
        });
    }

    pub fn publish_preview_ready(&self, story_id: &StoryId, scene_count: usize) {
        self.publish(WorkflowEvent::PreviewReady {
            story_id: story_id.to_string(),
            scene_count,
        });
    }

    pub fn publish_refinement_skipped(&self) {
        self.publish(WorkflowEvent::RefinementSkipped);
    }

    pub fn publish_story_refined(&self, story_id: &StoryId) {
        self.publish(WorkflowEvent::StoryRefined {
            story_id: story_id.to_string(),
        });
    }

    pub fn publish_story_complete(&self, story_id: &StoryId, scene_count: usize) {
        self.publish(WorkflowEvent::StoryComplete {
            story_id: story_id.to_string(),
            scene_count,
        });
    }

    pub fn publish_scene_updated(&self, scene_id: u32, synced: bool) {
        self.publish(WorkflowEvent::SceneUpdated { scene_id, synced });
    }

    pub fn publish_scene_image_regenerated(&self, scene_id: u32) {
        self.publish(WorkflowEvent::SceneImageRegenerated { scene_id });
    }

    pub fn publish_failed(&self, step: &str, message: &str) {
        self.publish(WorkflowEvent::Failed {
            step: step.to_string(),
            message: message.to_string(),
        });
    }

    pub fn publish_cancelled(&self, step: &str) {
        self.publish(WorkflowEvent::Cancelled {
            step: step.to_string(),
        });
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Err(e) = self.channel.send(event) {
            tracing::trace!(error = %e, "Workflow event dropped (no receivers)");
        }
    }
}

impl Default for WorkflowEvents {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let events = WorkflowEvents::default();
        let mut rx = events.subscribe();

        events.publish_stage_changed(WorkflowStage::Idle, WorkflowStage::Submitting);
        events.publish_refinement_skipped();

        assert_eq!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StageChanged {
                from: WorkflowStage::Idle,
                to: WorkflowStage::Submitting
            }
        );
        assert_eq!(rx.recv().await.unwrap(), WorkflowEvent::RefinementSkipped);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = WorkflowEvents::default();
        events.publish_scene_updated(1, false);
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::StageChanged {
            from: WorkflowStage::PreviewReady,
            to: WorkflowStage::SubmittingAssets,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "StageChanged", "data": {"from": "preview_ready", "to": "submitting_assets"}})
        );
    }
}
