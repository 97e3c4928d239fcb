//! Workflow State - 工作流状态机
//!
//! Idle → Submitting → (PollingGeneration | PreviewReady) → Refining → PreviewReady
//!      → SubmittingAssets → (PollingAssets | Complete)
//!
//! 任何进行中的状态都可以进入 Failed；reset 在任何状态下回到 Idle。

use serde::Serialize;

use crate::application::error::{WorkflowError, WorkflowStep};
use crate::domain::{GenerationSettings, GenerationTask, Story};

/// 工作流阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// 初始状态，等待提交
    #[default]
    Idle,
    /// 生成请求进行中
    Submitting,
    /// 轮询生成任务
    PollingGeneration,
    /// 预览就绪，可修改或确认
    PreviewReady,
    /// 修改请求进行中
    Refining,
    /// 资源生成请求进行中
    SubmittingAssets,
    /// 轮询资源任务
    PollingAssets,
    /// 完成（终态）
    Complete,
    /// 失败（终态）
    Failed,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::Submitting => "submitting",
            WorkflowStage::PollingGeneration => "polling_generation",
            WorkflowStage::PreviewReady => "preview_ready",
            WorkflowStage::Refining => "refining",
            WorkflowStage::SubmittingAssets => "submitting_assets",
            WorkflowStage::PollingAssets => "polling_assets",
            WorkflowStage::Complete => "complete",
            WorkflowStage::Failed => "failed",
        }
    }

    /// 有请求在途（此时拒绝新的 submit/refine/confirm）
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            WorkflowStage::Submitting | WorkflowStage::Refining | WorkflowStage::SubmittingAssets
        )
    }

    pub fn is_polling(&self) -> bool {
        matches!(
            self,
            WorkflowStage::PollingGeneration | WorkflowStage::PollingAssets
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStage::Complete | WorkflowStage::Failed)
    }

    /// 是否允许从 self 迁移到 next（reset 到 Idle 总是允许）
    pub fn can_transition_to(&self, next: WorkflowStage) -> bool {
        use WorkflowStage::*;

        if next == Idle {
            return true;
        }

        match (self, next) {
            (Idle | Failed, Submitting) => true,
            (Submitting, PollingGeneration | PreviewReady | Failed) => true,
            (PollingGeneration, PreviewReady | Failed) => true,
            (PreviewReady, Refining | SubmittingAssets) => true,
            (Refining, PreviewReady | Failed) => true,
            (SubmittingAssets, PollingAssets | Complete | Failed) => true,
            (PollingAssets, Complete | Failed | PreviewReady) => true,
            // recover
            (Failed, PreviewReady | Complete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().replace('_', " "))
    }
}

/// 面向界面的视图步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStep {
    Settings,
    Generating,
    Preview,
    Scenes,
    GeneratingAssets,
    Viewer,
}

/// 最近一次失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFailure {
    pub step: WorkflowStep,
    pub error: WorkflowError,
    /// recover 时回到的稳定阶段
    pub resume_to: WorkflowStage,
}

impl WorkflowFailure {
    pub fn message(&self) -> String {
        self.error.user_message()
    }
}

/// 工作流快照（只读副本）
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub stage: WorkflowStage,
    pub settings: Option<GenerationSettings>,
    pub preview: Option<Story>,
    pub story: Option<Story>,
    pub task: Option<GenerationTask>,
    pub failure: Option<WorkflowFailure>,
    /// 修改环节已完成或被跳过
    pub refinement_settled: bool,
}

impl WorkflowSnapshot {
    pub fn view(&self) -> ViewStep {
        let stage = match (&self.stage, &self.failure) {
            (WorkflowStage::Failed, Some(failure)) => failure.resume_to,
            (stage, _) => *stage,
        };

        match stage {
            WorkflowStage::Idle | WorkflowStage::Failed => ViewStep::Settings,
            WorkflowStage::Submitting | WorkflowStage::PollingGeneration => ViewStep::Generating,
            WorkflowStage::PreviewReady | WorkflowStage::Refining => {
                if self.refinement_settled {
                    ViewStep::Scenes
                } else {
                    ViewStep::Preview
                }
            }
            WorkflowStage::SubmittingAssets | WorkflowStage::PollingAssets => {
                ViewStep::GeneratingAssets
            }
            WorkflowStage::Complete => ViewStep::Viewer,
        }
    }
}
