//! Domain Layer - 领域层
//!
//! 包含:
//! - Story Context: 故事与场景
//! - 生成参数快照与生成任务
//! - 段落分割（整段正文拆分为场景）

pub mod story;

mod paragraphs;
mod settings;
mod task;

pub use paragraphs::{bucket_paragraphs, paragraphs_per_scene, split_paragraphs};
pub use settings::GenerationSettings;
pub use story::{
    AssetBundle, IdOrigin, Scene, Story, StoryError, StoryId, StoryMetadata, DEFAULT_TITLE,
};
pub use task::{clamp_progress, GenerationTask, TaskId, TaskStatus};
