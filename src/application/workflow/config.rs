//! Workflow Configuration
//!
//! 编排器的运行参数，直接作为配置文件的 `[workflow]` 段反序列化

use serde::Deserialize;
use std::time::Duration;

use super::policy::{ArtStylePolicy, RefinementPolicy, RefinementScope};

/// 工作流配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// 状态轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 故事创意的最少字符数（去除首尾空白后）
    #[serde(default = "default_min_idea_chars")]
    pub min_idea_chars: usize,

    #[serde(default = "default_min_scenes")]
    pub min_scenes: u8,

    #[serde(default = "default_max_scenes")]
    pub max_scenes: u8,

    /// 支持的画风
    #[serde(default = "default_supported_art_styles")]
    pub supported_art_styles: Vec<String>,

    /// 默认画风（substitute 策略下的替换值）
    #[serde(default = "default_art_style")]
    pub default_art_style: String,

    #[serde(default)]
    pub art_style_policy: ArtStylePolicy,

    #[serde(default)]
    pub refinement_scope: RefinementScope,

    /// 文本型修改结果截取的字符数
    #[serde(default = "default_refine_excerpt_chars")]
    pub refine_excerpt_chars: usize,

    /// 场景编辑是否同步到后端
    #[serde(default)]
    pub sync_scene_edits: bool,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_min_idea_chars() -> usize {
    10
}

fn default_min_scenes() -> u8 {
    3
}

fn default_max_scenes() -> u8 {
    8
}

fn default_supported_art_styles() -> Vec<String> {
    ["lego", "oil", "manga", "anime", "sketch"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_art_style() -> String {
    "anime".to_string()
}

fn default_refine_excerpt_chars() -> usize {
    100
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            min_idea_chars: default_min_idea_chars(),
            min_scenes: default_min_scenes(),
            max_scenes: default_max_scenes(),
            supported_art_styles: default_supported_art_styles(),
            default_art_style: default_art_style(),
            art_style_policy: ArtStylePolicy::default(),
            refinement_scope: RefinementScope::default(),
            refine_excerpt_chars: default_refine_excerpt_chars(),
            sync_scene_edits: false,
        }
    }
}

impl WorkflowConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refinement_policy(&self) -> RefinementPolicy {
        RefinementPolicy {
            scope: self.refinement_scope,
            excerpt_chars: self.refine_excerpt_chars,
        }
    }

    /// 画风是否受支持（忽略大小写）
    pub fn supports_art_style(&self, style: &str) -> bool {
        self.supported_art_styles
            .iter()
            .any(|s| s.eq_ignore_ascii_case(style.trim()))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_art_style_policy(mut self, policy: ArtStylePolicy) -> Self {
        self.art_style_policy = policy;
        self
    }

    pub fn with_refinement_scope(mut self, scope: RefinementScope) -> Self {
        self.refinement_scope = scope;
        self
    }

    pub fn with_sync_scene_edits(mut self, sync: bool) -> Self {
        self.sync_scene_edits = sync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.min_idea_chars, 10);
        assert_eq!((config.min_scenes, config.max_scenes), (3, 8));
        assert_eq!(config.refinement_policy(), RefinementPolicy::default());
        assert!(!config.sync_scene_edits);
    }

    #[test]
    fn test_supports_art_style_ignores_case() {
        let config = WorkflowConfig::default();
        assert!(config.supports_art_style("Manga"));
        assert!(config.supports_art_style(" oil "));
        assert!(!config.supports_art_style("watercolor"));
    }
}
