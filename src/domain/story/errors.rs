//! Story Context - Errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("Story has no scenes")]
    NoScenes,

    #[error("Scene not found: {0}")]
    SceneNotFound(u32),

    #[error("Duplicate scene id: {0}")]
    DuplicateScene(u32),

    #[error("Scene {0} text cannot be empty")]
    EmptySceneText(u32),
}
