//! Story API - 生成后端的类型化端点
//!
//! 后端 API:
//! - POST /api/stories/generate          生成故事（同步结果或任务令牌）
//! - GET  /api/stories/status/{taskId}   查询任务状态
//! - POST /api/stories/refine            按提示修改故事
//! - POST /api/stories/get_scenes        生成插图/音频
//! - POST /api/stories/regenerate_image  重新生成单个场景的插图
//! - PUT  /api/stories/{id}/scenes/{n}   同步场景文本
//! - GET  /                              健康检查

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{ApiRequest, TransportError, TransportPort};
use crate::domain::{GenerationSettings, Story, TaskId};

/// 生成请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    prompt: &'a str,
    genre: &'a str,
    tone: &'a str,
    target_audience: &'a str,
    language: &'a str,
    num_scenes: u8,
    art_style: &'a str,
}

#[derive(Debug, Serialize)]
struct RefineBody<'a> {
    prompt: &'a str,
    story: &'a Story,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetsBody<'a> {
    story: &'a Story,
    art_style: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateImageBody<'a> {
    story_id: &'a str,
    scene_id: u32,
    prompt: &'a str,
    art_style: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateSceneBody<'a> {
    text: &'a str,
}

/// Story API 配置
#[derive(Debug, Clone)]
pub struct StoryApiConfig {
    /// 健康检查路径
    pub health_path: String,
    /// 健康检查超时
    pub health_timeout: Duration,
}

impl Default for StoryApiConfig {
    fn default() -> Self {
        Self {
            health_path: "/".to_string(),
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Story API
///
/// 在 [`TransportPort`] 之上构建各端点的请求体，不做任何响应解释
#[derive(Clone)]
pub struct StoryApi {
    transport: Arc<dyn TransportPort>,
    config: StoryApiConfig,
}

impl StoryApi {
    pub fn new(transport: Arc<dyn TransportPort>) -> Self {
        Self::with_config(transport, StoryApiConfig::default())
    }

    pub fn with_config(transport: Arc<dyn TransportPort>, config: StoryApiConfig) -> Self {
        Self { transport, config }
    }

    fn encode<T: Serialize>(body: &T) -> Result<Value, TransportError> {
        serde_json::to_value(body).map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }

    /// 健康检查（短超时）
    pub async fn health(&self) -> Result<Value, TransportError> {
        let request = ApiRequest::get(self.config.health_path.clone())
            .with_timeout(self.config.health_timeout);
        self.transport.request(request).await
    }

    pub async fn generate(&self, settings: &GenerationSettings) -> Result<Value, TransportError> {
        let body = Self::encode(&GenerateBody {
            prompt: settings.idea(),
            genre: &settings.genre,
            tone: &settings.tone,
            target_audience: &settings.target_audience,
            language: &settings.language,
            num_scenes: settings.num_scenes,
            art_style: &settings.art_style,
        })?;

        tracing::debug!(
            num_scenes = settings.num_scenes,
            art_style = %settings.art_style,
            prompt_len = settings.idea().len(),
            "Requesting story generation"
        );
        self.transport
            .request(ApiRequest::post("/api/stories/generate", body))
            .await
    }

    pub async fn status(&self, task_id: &TaskId) -> Result<Value, TransportError> {
        let path = format!("/api/stories/status/{}", task_id);
        self.transport.request(ApiRequest::get(path)).await
    }

    pub async fn refine(&self, prompt: &str, story: &Story) -> Result<Value, TransportError> {
        let body = Self::encode(&RefineBody { prompt, story })?;
        tracing::debug!(story_id = %story.id(), prompt_len = prompt.len(), "Requesting story refinement");
        self.transport
            .request(ApiRequest::post("/api/stories/refine", body))
            .await
    }

    pub async fn generate_assets(
        &self,
        story: &Story,
        art_style: &str,
    ) -> Result<Value, TransportError> {
        let body = Self::encode(&AssetsBody { story, art_style })?;
        tracing::debug!(
            story_id = %story.id(),
            scenes = story.scene_count(),
            art_style = %art_style,
            "Requesting scene assets"
        );
        self.transport
            .request(ApiRequest::post("/api/stories/get_scenes", body))
            .await
    }

    pub async fn regenerate_image(
        &self,
        story_id: &str,
        scene_id: u32,
        prompt: &str,
        art_style: &str,
    ) -> Result<Value, TransportError> {
        let body = Self::encode(&RegenerateImageBody {
            story_id,
            scene_id,
            prompt,
            art_style,
        })?;
        self.transport
            .request(ApiRequest::post("/api/stories/regenerate_image", body))
            .await
    }

    pub async fn update_scene(
        &self,
        story_id: &str,
        scene_id: u32,
        text: &str,
    ) -> Result<Value, TransportError> {
        let body = Self::encode(&UpdateSceneBody { text })?;
        let path = format!("/api/stories/{}/scenes/{}", story_id, scene_id);
        self.transport.request(ApiRequest::put(path, body)).await
    }
}
