//! 生成任务
//!
//! 后端接受异步生成请求后返回的任务，由状态轮询器跟踪直到终态

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::story::{IdOrigin, Story};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 排队中
    Pending,
    /// 处理中
    Processing,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// 解析后端状态字符串，兼容常见同义词
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(TaskStatus::Pending),
            "processing" | "running" | "in_progress" => Some(TaskStatus::Processing),
            "completed" | "complete" | "done" | "success" => Some(TaskStatus::Completed),
            "failed" | "error" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务令牌
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    value: String,
    origin: IdOrigin,
}

impl TaskId {
    pub fn from_backend(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: IdOrigin::Backend,
        }
    }

    pub fn synthesize() -> Self {
        Self {
            value: format!("local-{}", Uuid::new_v4()),
            origin: IdOrigin::Local,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn origin(&self) -> IdOrigin {
        self.origin
    }

    pub fn is_local(&self) -> bool {
        self.origin == IdOrigin::Local
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// 生成任务
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 进度百分比 [0, 100]
    pub progress: u8,
    /// 当前步骤描述
    pub current_step: String,
    /// 预计耗时（秒）
    pub estimated_time_secs: Option<u64>,
    pub result: Option<Story>,
    pub error: Option<String>,
}

impl GenerationTask {
    /// 后端接受的异步任务
    pub fn accepted(id: TaskId, estimated_time_secs: Option<u64>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0,
            current_step: "Queued".to_string(),
            estimated_time_secs,
            result: None,
            error: None,
        }
    }

    /// 后端同步完成时本地合成的任务
    pub fn completed_locally(story: Story) -> Self {
        Self {
            id: TaskId::synthesize(),
            status: TaskStatus::Completed,
            progress: 100,
            current_step: "Generation complete".to_string(),
            estimated_time_secs: None,
            result: Some(story),
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 进度值裁剪到 [0, 100]
pub fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
