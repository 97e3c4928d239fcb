//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TransportPort）
//! - api: 生成后端的类型化端点
//! - normalizer: 后端响应规范化
//! - workflow: 工作流状态机与编排器
//! - error: 应用层错误定义

pub mod api;
pub mod error;
pub mod normalizer;
pub mod ports;
pub mod workflow;

pub use api::{StoryApi, StoryApiConfig};
pub use error::{WorkflowError, WorkflowStep};
pub use normalizer::{
    apply_assets, apply_refinement, classify, extract_image, image_reference, normalize,
    parse_status, AssetMergeDecoder, GeneratedStoryDecoder, ResultDecoder, StatusReport,
    Submission, FALLBACK_SCENE_TEXT,
};
pub use ports::{ApiRequest, HttpMethod, TransportError, TransportPort};
pub use workflow::{
    ArtStylePolicy, GenerationOrchestrator, RefinementPolicy, RefinementScope, ViewStep,
    WorkflowConfig, WorkflowFailure, WorkflowSnapshot, WorkflowStage,
};
