//! Workflow - 故事生成工作流
//!
//! - state: 状态机阶段、快照与失败记录
//! - policy: 后端变体之间互相矛盾的行为，作为显式策略暴露
//! - config: 编排器运行参数
//! - orchestrator: 编排器本体

mod config;
mod orchestrator;
mod policy;
mod state;

pub use config::WorkflowConfig;
pub use orchestrator::GenerationOrchestrator;
pub use policy::{ArtStylePolicy, RefinementPolicy, RefinementScope};
pub use state::{ViewStep, WorkflowFailure, WorkflowSnapshot, WorkflowStage};
