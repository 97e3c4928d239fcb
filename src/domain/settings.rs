//! 生成参数快照

use serde::{Deserialize, Serialize};

/// 生成参数
///
/// 用户独占的配置快照。传入生成请求后即视为不可变，
/// 编排器持有自己的副本，下一次请求使用新的快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// 故事创意
    pub story_idea: String,
    pub genre: String,
    pub tone: String,
    pub target_audience: String,
    pub art_style: String,
    pub language: String,
    /// 场景数量，取值范围由 workflow 配置约束（默认 3..=8）
    pub num_scenes: u8,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            story_idea: String::new(),
            genre: "fantasy".to_string(),
            tone: "lighthearted".to_string(),
            target_audience: "general".to_string(),
            art_style: "anime".to_string(),
            language: "en".to_string(),
            num_scenes: 4,
        }
    }
}

impl GenerationSettings {
    pub fn new(story_idea: impl Into<String>) -> Self {
        Self {
            story_idea: story_idea.into(),
            ..Default::default()
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_target_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = audience.into();
        self
    }

    pub fn with_art_style(mut self, art_style: impl Into<String>) -> Self {
        self.art_style = art_style.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_num_scenes(mut self, num_scenes: u8) -> Self {
        self.num_scenes = num_scenes;
        self
    }

    /// 去除首尾空白后的故事创意
    pub fn idea(&self) -> &str {
        self.story_idea.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GenerationSettings::new("A girl finds a door");
        assert_eq!(settings.genre, "fantasy");
        assert_eq!(settings.tone, "lighthearted");
        assert_eq!(settings.target_audience, "general");
        assert_eq!(settings.num_scenes, 4);
    }

    #[test]
    fn test_deserialize_partial_camel_case() {
        let settings: GenerationSettings = serde_json::from_value(serde_json::json!({
            "storyIdea": "A robot learns to paint",
            "artStyle": "manga",
            "numScenes": 6
        }))
        .unwrap();

        assert_eq!(settings.idea(), "A robot learns to paint");
        assert_eq!(settings.art_style, "manga");
        assert_eq!(settings.num_scenes, 6);
        assert_eq!(settings.language, "en");
    }
}
