//! Story Context - 故事限界上下文
//!
//! 职责:
//! - Story 聚合管理
//! - Scene 实体
//! - 标识、元数据与成品资源值对象

mod aggregate;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::{Story, DEFAULT_TITLE};
pub use entities::Scene;
pub use errors::StoryError;
pub use value_objects::{AssetBundle, IdOrigin, StoryId, StoryMetadata};
