//! Story Context - Entities

use serde::Serialize;

use super::StoryError;

/// 场景 - 故事的最小叙事单位
///
/// 不变量:
/// - id 从 1 开始，在 Story 内唯一
/// - text 不可为空
/// - 图片/音频引用只能从无到有，不会被移除；只有显式的重新生成会替换图片
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    id: u32,
    title: String,
    text: String,
    image_url: Option<String>,
    audio_url: Option<String>,
    scene_number: u32,
    image_prompt: String,
}

impl Scene {
    pub fn new(id: u32, text: impl Into<String>) -> Result<Self, StoryError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(StoryError::EmptySceneText(id));
        }
        Ok(Self {
            id,
            title: format!("Scene {}", id),
            text,
            image_url: None,
            audio_url: None,
            scene_number: id,
            image_prompt: format!("Scene {} illustration", id),
        })
    }

    /// 占位场景（文本由调用方保证非空）
    pub(crate) fn notice(id: u32, text: &str) -> Self {
        Self {
            id,
            title: format!("Scene {}", id),
            text: text.to_string(),
            image_url: None,
            audio_url: None,
            scene_number: id,
            image_prompt: format!("Scene {} illustration", id),
        }
    }

    /// 设置标题，空白标题保持默认值
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.trim().is_empty() {
            self.title = title.trim().to_string();
        }
        self
    }

    pub fn with_image_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.image_prompt = prompt.trim().to_string();
        }
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    pub fn scene_number(&self) -> u32 {
        self.scene_number
    }

    pub fn image_prompt(&self) -> &str {
        &self.image_prompt
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), StoryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StoryError::EmptySceneText(self.id));
        }
        self.text = text;
        Ok(())
    }

    pub fn set_image_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.image_prompt = prompt;
        }
    }

    /// 附加图片，已有图片时不覆盖，返回是否发生了变化
    pub fn attach_image(&mut self, url: impl Into<String>) -> bool {
        if self.image_url.is_some() {
            return false;
        }
        self.image_url = Some(url.into());
        true
    }

    /// 重新生成后替换图片
    pub fn replace_image(&mut self, url: impl Into<String>) {
        self.image_url = Some(url.into());
    }

    /// 附加音频，已有音频时不覆盖
    pub fn attach_audio(&mut self, url: impl Into<String>) -> bool {
        if self.audio_url.is_some() {
            return false;
        }
        self.audio_url = Some(url.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_defaults() {
        let scene = Scene::new(2, "  Once upon a time.  ").unwrap();
        assert_eq!(scene.title(), "Scene 2");
        assert_eq!(scene.text(), "Once upon a time.");
        assert_eq!(scene.image_prompt(), "Scene 2 illustration");
        assert_eq!(scene.scene_number(), 2);
        assert!(scene.image_url().is_none());
    }

    #[test]
    fn test_empty_text_rejected() {
        assert_eq!(Scene::new(1, "   "), Err(StoryError::EmptySceneText(1)));

        let mut scene = Scene::new(1, "text").unwrap();
        assert!(scene.set_text("").is_err());
        assert_eq!(scene.text(), "text");
    }

    #[test]
    fn test_image_is_attached_once_and_replaced_explicitly() {
        let mut scene = Scene::new(1, "text").unwrap();
        assert!(scene.attach_image("https://cdn/a.png"));
        assert!(!scene.attach_image("https://cdn/b.png"));
        assert_eq!(scene.image_url(), Some("https://cdn/a.png"));

        scene.replace_image("https://cdn/c.png");
        assert_eq!(scene.image_url(), Some("https://cdn/c.png"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let scene = Scene::new(1, "text").unwrap().with_title("Opening");
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["sceneNumber"], 1);
        assert_eq!(json["imagePrompt"], "Scene 1 illustration");
        assert_eq!(json["title"], "Opening");
        assert!(json["imageUrl"].is_null());
    }
}
