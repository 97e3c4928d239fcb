//! 应用层错误定义
//!
//! 编排器边界上的统一错误类型。传输层与规范化错误原样向上传递，
//! 编排器只附加失败步骤的上下文，不做自动重试。

use thiserror::Error;

use crate::application::ports::TransportError;
use crate::application::workflow::WorkflowStage;

/// 工作流步骤（错误上下文）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    HealthCheck,
    Generate,
    PollGeneration,
    Refine,
    GenerateAssets,
    PollAssets,
    EditScene,
    RegenerateImage,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::HealthCheck => "Health check",
            WorkflowStep::Generate => "Story generation",
            WorkflowStep::PollGeneration => "Generation status check",
            WorkflowStep::Refine => "Story refinement",
            WorkflowStep::GenerateAssets => "Image generation",
            WorkflowStep::PollAssets => "Image status check",
            WorkflowStep::EditScene => "Scene update",
            WorkflowStep::RegenerateImage => "Image regeneration",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作流错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// 用户输入无效，从不触达网络
    #[error("Validation error: {0}")]
    Validation(String),

    /// 在当前状态下不允许的操作
    #[error("Cannot {operation} while the workflow is {stage}")]
    InvalidState {
        operation: &'static str,
        stage: WorkflowStage,
    },

    #[error("{step} failed: {source}")]
    Transport {
        step: WorkflowStep,
        #[source]
        source: TransportError,
    },

    /// HTTP 成功但负载语义上为空或格式不对
    #[error("{step} failed: {message}")]
    BackendLogic { step: WorkflowStep, message: String },

    /// 后端任务报告失败
    #[error("{step} failed: {message}")]
    TaskFailed { step: WorkflowStep, message: String },

    /// 操作被 cancel/reset 放弃
    #[error("{step} was cancelled")]
    Cancelled { step: WorkflowStep },
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_state(operation: &'static str, stage: WorkflowStage) -> Self {
        Self::InvalidState { operation, stage }
    }

    /// 2xx 但响应体无法解析时归为 BackendLogic
    pub fn transport(step: WorkflowStep, source: TransportError) -> Self {
        match source {
            TransportError::MalformedBody(message) => Self::BackendLogic { step, message },
            source => Self::Transport { step, source },
        }
    }

    pub fn backend_logic(step: WorkflowStep, message: impl Into<String>) -> Self {
        Self::BackendLogic {
            step,
            message: message.into(),
        }
    }

    /// 失败发生的步骤
    pub fn step(&self) -> Option<WorkflowStep> {
        match self {
            WorkflowError::Validation(_) | WorkflowError::InvalidState { .. } => None,
            WorkflowError::Transport { step, .. }
            | WorkflowError::BackendLogic { step, .. }
            | WorkflowError::TaskFailed { step, .. }
            | WorkflowError::Cancelled { step } => Some(*step),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WorkflowError::Validation(_))
    }

    /// 面向用户的简短描述
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Validation(msg) => msg.clone(),
            WorkflowError::InvalidState { .. } => {
                "Please wait for the current step to finish.".to_string()
            }
            WorkflowError::Transport { step, source } => {
                format!("{} failed: {}", step, source.user_message())
            }
            WorkflowError::BackendLogic { step, .. } => {
                format!("{} failed: the server returned an unexpected response.", step)
            }
            WorkflowError::TaskFailed { step, message } => format!("{} failed: {}", step, message),
            WorkflowError::Cancelled { step } => format!("{} was cancelled.", step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_error_keeps_step_context() {
        let err = WorkflowError::transport(
            WorkflowStep::Generate,
            TransportError::Timeout(Duration::from_secs(120)),
        );

        assert_eq!(err.step(), Some(WorkflowStep::Generate));
        assert_eq!(
            err.user_message(),
            "Story generation failed: Request timed out. Please try again."
        );
    }

    #[test]
    fn test_malformed_body_is_backend_logic() {
        let err = WorkflowError::transport(
            WorkflowStep::Refine,
            TransportError::MalformedBody("expected value".to_string()),
        );
        assert!(matches!(err, WorkflowError::BackendLogic { step: WorkflowStep::Refine, .. }));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = WorkflowError::invalid_state("refine the story", WorkflowStage::Idle);
        assert_eq!(err.to_string(), "Cannot refine the story while the workflow is idle");
        assert_eq!(err.step(), None);
    }

    #[test]
    fn test_validation_message_is_user_facing() {
        let err = WorkflowError::validation("Story idea should be at least 10 characters long");
        assert!(err.is_validation());
        assert_eq!(
            err.user_message(),
            "Story idea should be at least 10 characters long"
        );
    }
}
