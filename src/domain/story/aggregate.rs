//! Story Context - Aggregate Root

use serde::Serialize;
use std::collections::HashSet;

use super::{AssetBundle, Scene, StoryError, StoryId, StoryMetadata};

/// 后端未给出标题时使用
pub const DEFAULT_TITLE: &str = "Generated Story";

/// Story 聚合根
///
/// 不变量:
/// - 至少包含一个场景
/// - 场景按 scene_number 升序排列，顺序稳定
/// - 场景 id 唯一
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    id: StoryId,
    title: String,
    metadata: StoryMetadata,
    scenes: Vec<Scene>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assets: Option<AssetBundle>,
}

impl Story {
    pub fn new(
        id: StoryId,
        title: impl Into<String>,
        mut metadata: StoryMetadata,
        mut scenes: Vec<Scene>,
    ) -> Result<Self, StoryError> {
        if scenes.is_empty() {
            return Err(StoryError::NoScenes);
        }

        let mut seen = HashSet::with_capacity(scenes.len());
        for scene in &scenes {
            if !seen.insert(scene.id()) {
                return Err(StoryError::DuplicateScene(scene.id()));
            }
        }

        // sort_by_key 是稳定排序
        scenes.sort_by_key(|s| s.scene_number());
        metadata.total_scenes = scenes.len();

        let title = title.into();
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title.trim().to_string()
        };

        Ok(Self {
            id,
            title,
            metadata,
            scenes,
            assets: None,
        })
    }

    /// 只有一个场景的故事，不会失败
    pub(crate) fn single_scene(
        id: StoryId,
        title: impl Into<String>,
        mut metadata: StoryMetadata,
        scene: Scene,
    ) -> Self {
        metadata.total_scenes = 1;
        let title = title.into();
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title.trim().to_string()
        };
        Self {
            id,
            title,
            metadata,
            scenes: vec![scene],
            assets: None,
        }
    }

    // Getters
    pub fn id(&self) -> &StoryId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn metadata(&self) -> &StoryMetadata {
        &self.metadata
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn scene(&self, id: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id() == id)
    }

    pub fn assets(&self) -> Option<&AssetBundle> {
        self.assets.as_ref()
    }

    /// 可变访问场景切片（不能改变数量和顺序）
    pub(crate) fn scenes_mut(&mut self) -> &mut [Scene] {
        &mut self.scenes
    }

    pub fn scene_mut(&mut self, id: u32) -> Result<&mut Scene, StoryError> {
        self.scenes
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(StoryError::SceneNotFound(id))
    }

    pub fn update_scene_text(&mut self, id: u32, text: impl Into<String>) -> Result<(), StoryError> {
        self.scene_mut(id)?.set_text(text)
    }

    pub fn merge_assets(&mut self, bundle: AssetBundle) {
        if bundle.is_empty() {
            return;
        }
        match self.assets.as_mut() {
            Some(existing) => existing.merge(bundle),
            None => self.assets = Some(bundle),
        }
    }

    /// 完整正文，场景之间以空行分隔
    pub fn full_text(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.scenes
            .iter()
            .map(|s| s.text().split_whitespace().count())
            .sum()
    }
}
