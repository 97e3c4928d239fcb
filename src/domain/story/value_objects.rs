//! Story Context - Value Objects

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::domain::GenerationSettings;

/// 标识来源
///
/// 后端同步返回结果时不会给出 id，客户端需要自行合成一个占位 id，
/// 调用方可以据此区分权威 id 与本地占位 id。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdOrigin {
    /// 后端签发
    Backend,
    /// 客户端本地合成
    Local,
}

/// 故事唯一标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoryId {
    value: String,
    origin: IdOrigin,
}

impl StoryId {
    pub fn from_backend(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: IdOrigin::Backend,
        }
    }

    /// 本地合成 id（`local-<uuid>`）
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

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

// 后端只认识字符串 id
impl Serialize for StoryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

/// 故事元数据
///
/// 不变量: 所有字段都有确定的值（请求值或默认值），不会出现空缺
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    pub genre: String,
    pub tone: String,
    pub art_style: String,
    pub target_audience: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub total_scenes: usize,
}

impl StoryMetadata {
    /// 从生成参数快照构建元数据，空白字段回落到默认值
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        let defaults = GenerationSettings::default();
        let pick = |value: &str, fallback: String| {
            let value = value.trim();
            if value.is_empty() {
                fallback
            } else {
                value.to_string()
            }
        };

        Self {
            genre: pick(&settings.genre, defaults.genre),
            tone: pick(&settings.tone, defaults.tone),
            art_style: pick(&settings.art_style, defaults.art_style),
            target_audience: pick(&settings.target_audience, defaults.target_audience),
            language: pick(&settings.language, defaults.language),
            created_at: Utc::now(),
            total_scenes: 0,
        }
    }
}

/// 故事附带的成品资源
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audiobook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flipbook: Option<serde_json::Value>,
}

impl AssetBundle {
    pub fn is_empty(&self) -> bool {
        self.pdf_url.is_none() && self.audiobook_url.is_none() && self.flipbook.is_none()
    }

    /// 合并另一份资源，只补充新出现的字段
    pub fn merge(&mut self, other: AssetBundle) {
        if other.pdf_url.is_some() {
            self.pdf_url = other.pdf_url;
        }
        if other.audiobook_url.is_some() {
            self.audiobook_url = other.audiobook_url;
        }
        if other.flipbook.is_some() {
            self.flipbook = other.flipbook;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_id_is_tagged_local() {
        let id = StoryId::synthesize();
        assert!(id.is_local());
        assert!(id.as_str().starts_with("local-"));
        assert_eq!(StoryId::from_backend("abc").origin(), IdOrigin::Backend);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let json = serde_json::to_value(StoryId::from_backend("s-1")).unwrap();
        assert_eq!(json, serde_json::json!("s-1"));
    }

    #[test]
    fn test_metadata_resolves_blank_fields() {
        let mut settings = GenerationSettings::new("A girl finds a door");
        settings.genre = "  ".to_string();
        settings.tone = "dark".to_string();

        let metadata = StoryMetadata::from_settings(&settings);
        assert_eq!(metadata.genre, "fantasy");
        assert_eq!(metadata.tone, "dark");
        assert_eq!(metadata.language, "en");
    }
}
