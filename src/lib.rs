//! Taleforge - 故事生成工作流客户端
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Story Context: 故事、场景与资源
//! - GenerationSettings / GenerationTask
//!
//! 应用层 (application/):
//! - Ports: TransportPort
//! - StoryApi: 后端端点
//! - Normalizer: 后端响应规范化
//! - Workflow: 状态机与编排器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: Reqwest / Fake Transport
//! - Worker: StatusPoller 任务轮询
//! - Events: 工作流事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{GenerationOrchestrator, WorkflowConfig, WorkflowError, WorkflowStage};
pub use config::{load_config, AppConfig};
