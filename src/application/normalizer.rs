//! Story Normalizer - 后端响应规范化
//!
//! 后端返回的故事形态并不统一:
//! - 编号键: `{"scene_1": "...", "scene_2": {...}}`
//! - 场景列表: `{"scenes": ["...", {"text": "..."}]}`
//! - 整段正文: `"..."` 或 `{"story": "..."}`
//!
//! 本模块把它们全部转换为规范的 [`Story`]，所有函数都是无状态的纯函数。

use serde_json::{Map, Value};

use crate::application::workflow::{RefinementPolicy, RefinementScope};
use crate::domain::{
    bucket_paragraphs, clamp_progress, split_paragraphs, AssetBundle, GenerationSettings, Scene,
    Story, StoryId, StoryMetadata, TaskId, TaskStatus, DEFAULT_TITLE,
};

/// 所有提取策略都没有得到场景时使用的占位文本
pub const FALLBACK_SCENE_TEXT: &str =
    "We couldn't split this story into scenes. Please try generating it again.";

const TEXT_KEYS: &[&str] = &["text", "Text"];
const TITLE_KEYS: &[&str] = &["title", "Title"];
const IMAGE_PROMPT_KEYS: &[&str] = &["imagePrompt", "image_prompt"];
const IMAGE_KEYS: &[&str] = &["PIL", "image", "imageUrl", "image_url"];
const AUDIO_KEYS: &[&str] = &["audio", "audioUrl", "audio_url"];
const BLOB_KEYS: &[&str] = &["story", "text", "content"];
const ID_KEYS: &[&str] = &["id", "storyId", "story_id"];

/// 已知的 base64 图片签名
const IMAGE_SIGNATURES: &[(&str, &str)] = &[
    ("iVBORw0KGgo", "image/png"),
    ("/9j/", "image/jpeg"),
    ("R0lGOD", "image/gif"),
    ("UklGR", "image/webp"),
];

/// 取第一个非空字符串字段
fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// 字符串或数字形式的标识
fn id_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn is_scene_key(key: &str) -> bool {
    key.strip_prefix("scene_")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// 场景条目所在的容器（资源接口把条目包在 `formatted_scenes` 里）
fn scene_container(raw: &Value) -> &Value {
    match raw.get("formatted_scenes") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    }
}

fn has_story_content(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| is_scene_key(k))
        || obj.get("scenes").map(Value::is_array).unwrap_or(false)
        || obj.get("story").map(|v| !v.is_null()).unwrap_or(false)
        || obj.get("formatted_scenes").map(Value::is_object).unwrap_or(false)
}

/// 提交响应的分类
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// 后端接受了异步任务
    Task {
        task_id: TaskId,
        estimated_time_secs: Option<u64>,
    },
    /// 同步返回的结果
    Payload,
}

/// 判断响应是任务令牌还是同步结果
pub fn classify(raw: &Value) -> Submission {
    let Some(obj) = raw.as_object() else {
        return Submission::Payload;
    };

    match id_field(obj, &["taskId", "task_id"]) {
        Some(task_id) if !has_story_content(obj) => Submission::Task {
            task_id: TaskId::from_backend(task_id),
            estimated_time_secs: obj
                .get("estimatedTime")
                .or_else(|| obj.get("estimated_time"))
                .and_then(Value::as_f64)
                .filter(|secs| *secs >= 0.0)
                .map(|secs| secs.round() as u64),
        },
        _ => Submission::Payload,
    }
}

/// 任务状态响应
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: TaskStatus,
    pub progress: u8,
    pub current_step: String,
    /// 完成时携带的原始结果
    pub story: Option<Value>,
    pub error: Option<String>,
}

fn default_step(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Waiting in queue",
        TaskStatus::Processing => "Generating",
        TaskStatus::Completed => "Generation complete",
        TaskStatus::Failed => "Generation failed",
    }
}

/// 解析 `GET /api/stories/status/{taskId}` 的响应
pub fn parse_status(raw: &Value) -> Result<StatusReport, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "status response is not a JSON object".to_string())?;

    let status_text = str_field(obj, &["status"])
        .ok_or_else(|| "status response carries no status".to_string())?;
    let status = TaskStatus::parse(status_text)
        .ok_or_else(|| format!("unknown task status '{}'", status_text))?;

    let progress = obj
        .get("progress")
        .and_then(Value::as_f64)
        .map(clamp_progress)
        .unwrap_or(if status == TaskStatus::Completed { 100 } else { 0 });

    let current_step = str_field(obj, &["currentStep", "current_step", "message"])
        .unwrap_or(default_step(status))
        .to_string();

    let story = obj
        .get("story")
        .or_else(|| obj.get("result"))
        .filter(|v| !v.is_null())
        .cloned();

    Ok(StatusReport {
        status,
        progress,
        current_step,
        story,
        error: str_field(obj, &["error", "detail"]).map(str::to_string),
    })
}

/// 把图片负载转换为可直接引用的地址
///
/// - URL、绝对/相对路径、已有的 data URI 原样返回
/// - 内联 base64 改写为自描述的 data URI（按签名识别 MIME，默认 png）
pub fn image_reference(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    if payload.starts_with("data:")
        || payload.starts_with("http://")
        || payload.starts_with("https://")
    {
        return Some(payload.to_string());
    }

    // JPEG 的 base64 以 "/9j/" 开头，必须在路径判断之前识别
    if let Some((_, mime)) = IMAGE_SIGNATURES
        .iter()
        .find(|(signature, _)| payload.starts_with(signature))
    {
        return Some(format!("data:{};base64,{}", mime, payload));
    }

    if payload.starts_with('/') || payload.starts_with("./") || payload.starts_with("../") {
        return Some(payload.to_string());
    }

    if looks_like_base64(payload) {
        return Some(format!("data:image/png;base64,{}", payload));
    }

    Some(payload.to_string())
}

fn looks_like_base64(payload: &str) -> bool {
    payload.len() >= 16
        && payload
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

/// 从单个条目构建场景（纯文本或对象）
fn scene_from_entry(id: u32, entry: &Value) -> Option<Scene> {
    match entry {
        Value::String(text) => Scene::new(id, text.as_str()).ok(),
        Value::Object(obj) => {
            let mut scene = Scene::new(id, str_field(obj, TEXT_KEYS)?).ok()?;
            if let Some(title) = str_field(obj, TITLE_KEYS) {
                scene = scene.with_title(title);
            }
            if let Some(prompt) = str_field(obj, IMAGE_PROMPT_KEYS) {
                scene = scene.with_image_prompt(prompt);
            }
            if let Some(image) = str_field(obj, IMAGE_KEYS).and_then(image_reference) {
                scene.attach_image(image);
            }
            if let Some(audio) = str_field(obj, AUDIO_KEYS) {
                scene.attach_audio(audio);
            }
            Some(scene)
        }
        _ => None,
    }
}

/// 策略 (a): 编号键 scene_1..scene_N，缺失的键直接跳过
fn extract_keyed(raw: &Value, requested: usize) -> Vec<Scene> {
    let Some(obj) = scene_container(raw).as_object() else {
        return Vec::new();
    };

    (1..=requested)
        .filter_map(|i| {
            let entry = obj.get(&format!("scene_{}", i))?;
            scene_from_entry(i as u32, entry)
        })
        .collect()
}

fn scene_list(raw: &Value) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items),
        other => scene_container(other).get("scenes").and_then(Value::as_array),
    }
}

/// 策略 (b): 场景列表，按位置编号
fn extract_listed(raw: &Value) -> Vec<Scene> {
    let Some(items) = scene_list(raw) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| scene_from_entry(index as u32 + 1, entry))
        .collect()
}

fn blob_text(raw: &Value) -> Option<&str> {
    match raw {
        Value::String(text) => Some(text.as_str()),
        Value::Object(obj) => str_field(obj, BLOB_KEYS),
        _ => None,
    }
}

/// 策略 (c): 整段正文按空行切段后向上取整分桶
fn extract_blob(raw: &Value, requested: usize) -> Vec<Scene> {
    let Some(text) = blob_text(raw) else {
        return Vec::new();
    };

    let paragraphs = split_paragraphs(text);
    bucket_paragraphs(&paragraphs, requested)
        .into_iter()
        .enumerate()
        .filter_map(|(index, bucket)| Scene::new(index as u32 + 1, bucket).ok())
        .collect()
}

fn extract_scenes(raw: &Value, requested: usize) -> Vec<Scene> {
    let keyed = extract_keyed(raw, requested);
    if !keyed.is_empty() {
        return keyed;
    }

    let listed = extract_listed(raw);
    if !listed.is_empty() {
        return listed;
    }

    extract_blob(raw, requested)
}

/// 规范化后端返回的故事
///
/// 永远至少返回一个场景：提取失败时返回一个带占位提示的场景
pub fn normalize(raw: &Value, requested_scenes: usize, settings: &GenerationSettings) -> Story {
    if let Some(inner) = raw.get("story").filter(|v| v.is_object()) {
        return normalize(inner, requested_scenes, settings);
    }

    let requested = requested_scenes.max(1);
    let obj = raw.as_object();
    let id = obj
        .and_then(|o| id_field(o, ID_KEYS))
        .map(StoryId::from_backend)
        .unwrap_or_else(StoryId::synthesize);
    let title = obj
        .and_then(|o| str_field(o, TITLE_KEYS))
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let metadata = StoryMetadata::from_settings(settings);

    let scenes = extract_scenes(raw, requested);
    if scenes.is_empty() {
        tracing::warn!(requested, "No scenes extracted from backend payload, using fallback scene");
        return Story::single_scene(id, title, metadata, Scene::notice(1, FALLBACK_SCENE_TEXT));
    }

    match Story::new(id.clone(), title.clone(), metadata.clone(), scenes) {
        Ok(story) => story,
        Err(e) => {
            tracing::warn!(error = %e, "Backend scenes rejected, using fallback scene");
            Story::single_scene(id, title, metadata, Scene::notice(1, FALLBACK_SCENE_TEXT))
        }
    }
}

fn asset_bundle(raw: &Value) -> AssetBundle {
    let Some(obj) = raw.as_object() else {
        return AssetBundle::default();
    };

    AssetBundle {
        pdf_url: str_field(obj, &["pdfUrl", "pdf_url"]).map(str::to_string),
        audiobook_url: str_field(obj, &["audiobookUrl", "audiobook_url"]).map(str::to_string),
        flipbook: obj.get("flipbook").filter(|v| !v.is_null()).cloned(),
    }
}

/// 合并单个场景的资源，返回条目是否携带了资源
fn merge_scene_assets(scene: &mut Scene, entry: &Map<String, Value>) -> bool {
    let mut has_assets = false;

    if let Some(image) = str_field(entry, IMAGE_KEYS).and_then(image_reference) {
        has_assets = true;
        scene.attach_image(image);
        // 只有非空文本才覆盖原文
        if let Some(text) = str_field(entry, TEXT_KEYS) {
            let _ = scene.set_text(text);
        }
    }

    if let Some(audio) = str_field(entry, AUDIO_KEYS) {
        has_assets = true;
        scene.attach_audio(audio);
    }

    has_assets
}

const SCENE_NUMBER_KEYS: &[&str] = &["sceneNumber", "scene_number", "id"];

fn scene_number_of(item: &Value) -> Option<u64> {
    SCENE_NUMBER_KEYS
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_u64))
}

/// 按场景编号查找条目；没有编号的条目按位置对应
fn find_list_entry(items: &[Value], scene_id: u32, index: usize) -> Option<&Value> {
    items
        .iter()
        .find(|item| scene_number_of(item) == Some(u64::from(scene_id)))
        .or_else(|| items.get(index).filter(|item| scene_number_of(item).is_none()))
}

/// 把资源生成结果合并到已有故事上
///
/// 条目通过 `scene_{id}` 键或场景列表（`sceneNumber` 或位置）定位。
/// 既没有匹配到任何场景资源、也没有成品资源时返回错误。
pub fn apply_assets(story: &Story, raw: &Value) -> Result<Story, String> {
    let raw = match raw.get("story") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };
    let container = scene_container(raw);
    let list = scene_list(raw);

    let mut updated = story.clone();
    let mut matched = 0;

    for (index, scene) in updated.scenes_mut().iter_mut().enumerate() {
        let entry = container
            .get(format!("scene_{}", scene.id()))
            .or_else(|| list.and_then(|items| find_list_entry(items, scene.id(), index)));

        if let Some(entry) = entry.and_then(Value::as_object) {
            if merge_scene_assets(scene, entry) {
                matched += 1;
            }
        }
    }

    let mut bundle = asset_bundle(raw);
    if !std::ptr::eq(container, raw) {
        bundle.merge(asset_bundle(container));
    }

    if matched == 0 && bundle.is_empty() {
        return Err("asset response contained no scene images or audio".to_string());
    }

    tracing::debug!(
        story_id = %updated.id(),
        matched_scenes = matched,
        has_bundle = !bundle.is_empty(),
        "Scene assets merged"
    );
    updated.merge_assets(bundle);
    Ok(updated)
}

/// 从重新生成图片的响应中取出图片地址
pub fn extract_image(raw: &Value) -> Option<String> {
    match raw {
        Value::String(payload) => image_reference(payload),
        Value::Object(obj) => str_field(obj, IMAGE_KEYS).and_then(image_reference),
        _ => None,
    }
}

fn refined_value(raw: &Value) -> &Value {
    if let Some(obj) = raw.as_object() {
        for key in ["refined_story", "refinedStory", "story"] {
            if let Some(value) = obj.get(key).filter(|v| !v.is_null()) {
                return value;
            }
        }
    }
    raw
}

fn in_scope(scope: RefinementScope, index: usize) -> bool {
    match scope {
        RefinementScope::AllScenes => true,
        RefinementScope::LeadScene => index == 0,
    }
}

/// 把修改结果合并到故事上
///
/// - 结构化结果（编号键或场景列表）：按场景 id（或位置）替换正文
/// - 文本结果：截取前 `excerpt_chars` 个字符，以 `[Refined: ...]` 附注追加到正文
///
/// 两种方式都只作用于 `policy.scope` 覆盖的场景。
pub fn apply_refinement(
    story: &Story,
    raw: &Value,
    policy: &RefinementPolicy,
) -> Result<Story, String> {
    let value = refined_value(raw);
    let mut refined = story.clone();

    let max_id = story.scenes().iter().map(Scene::id).max().unwrap_or(1) as usize;
    let mut replacements = extract_keyed(value, max_id);
    if replacements.is_empty() {
        replacements = extract_listed(value);
    }

    if !replacements.is_empty() {
        let mut applied = 0;
        for (index, scene) in refined.scenes_mut().iter_mut().enumerate() {
            if !in_scope(policy.scope, index) {
                continue;
            }
            if let Some(replacement) = replacements.iter().find(|r| r.id() == scene.id()) {
                if scene.set_text(replacement.text()).is_ok() {
                    applied += 1;
                }
            }
        }

        if applied == 0 {
            return Err("refined scenes did not match the current story".to_string());
        }
        return Ok(refined);
    }

    let text = blob_text(value)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "refinement response carried no refined content".to_string())?;
    let excerpt: String = text.chars().take(policy.excerpt_chars).collect();

    for (index, scene) in refined.scenes_mut().iter_mut().enumerate() {
        if !in_scope(policy.scope, index) {
            continue;
        }
        let merged = format!("{}\n\n[Refined: {}...]", scene.text(), excerpt);
        let _ = scene.set_text(merged);
    }

    Ok(refined)
}

/// 任务完成结果的解码器
///
/// 生成任务与资源任务的完成负载含义不同，由轮询器按任务类型选择
pub trait ResultDecoder: Send + Sync {
    fn decode(&self, payload: &Value) -> Result<Story, String>;
}

/// 生成任务：规范化为新故事
pub struct GeneratedStoryDecoder {
    settings: GenerationSettings,
}

impl GeneratedStoryDecoder {
    pub fn new(settings: GenerationSettings) -> Self {
        Self { settings }
    }
}

impl ResultDecoder for GeneratedStoryDecoder {
    fn decode(&self, payload: &Value) -> Result<Story, String> {
        Ok(normalize(
            payload,
            usize::from(self.settings.num_scenes),
            &self.settings,
        ))
    }
}

/// 资源任务：合并到预览故事上
pub struct AssetMergeDecoder {
    base: Story,
}

impl AssetMergeDecoder {
    pub fn new(base: Story) -> Self {
        Self { base }
    }
}

impl ResultDecoder for AssetMergeDecoder {
    fn decode(&self, payload: &Value) -> Result<Story, String> {
        apply_assets(&self.base, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(num_scenes: u8) -> GenerationSettings {
        GenerationSettings::new("A girl finds a door").with_num_scenes(num_scenes)
    }

    fn texts(story: &Story) -> Vec<&str> {
        story.scenes().iter().map(Scene::text).collect()
    }

    #[test]
    fn test_keyed_scenes_in_order() {
        let raw = json!({"scene_1": "A.", "scene_2": "B.", "scene_3": "C."});
        let story = normalize(&raw, 3, &settings(3));

        assert_eq!(texts(&story), vec!["A.", "B.", "C."]);
        let titles: Vec<&str> = story.scenes().iter().map(Scene::title).collect();
        assert_eq!(titles, vec!["Scene 1", "Scene 2", "Scene 3"]);
        assert_eq!(story.title(), DEFAULT_TITLE);
        assert!(story.id().is_local());
    }

    #[test]
    fn test_keyed_scenes_never_exceed_requested() {
        let all = ["one", "two", "three", "four", "five", "six", "seven", "eight"];

        for requested in 3..=8usize {
            // 每种子集：只保留下标为偶数或奇数的键，以及全部键
            for pattern in 0..3 {
                let mut raw = Map::new();
                let mut expected = Vec::new();
                for (i, text) in all.iter().enumerate() {
                    let keep = match pattern {
                        0 => true,
                        1 => i % 2 == 0,
                        _ => i % 2 == 1,
                    };
                    if keep {
                        raw.insert(format!("scene_{}", i + 1), json!(text));
                        if i < requested {
                            expected.push((i as u32 + 1, *text));
                        }
                    }
                }

                let story = normalize(&Value::Object(raw), requested, &settings(requested as u8));
                let got: Vec<(u32, &str)> =
                    story.scenes().iter().map(|s| (s.id(), s.text())).collect();
                assert_eq!(got, expected, "requested={} pattern={}", requested, pattern);
            }
        }
    }

    #[test]
    fn test_keyed_scene_objects_and_absent_keys() {
        let raw = json!({
            "title": "The Door",
            "scene_1": {"text": "Opening.", "title": "Attic", "imagePrompt": "dusty attic"},
            "scene_3": "Closing."
        });
        let story = normalize(&raw, 4, &settings(4));

        assert_eq!(story.title(), "The Door");
        assert_eq!(story.scene_count(), 2);
        assert_eq!(story.scenes()[0].title(), "Attic");
        assert_eq!(story.scenes()[0].image_prompt(), "dusty attic");
        assert_eq!(story.scenes()[1].id(), 3);
    }

    #[test]
    fn test_scene_list_mapped_positionally() {
        let raw = json!({
            "id": "story-9",
            "scenes": ["Plain text.", {"text": "Object text.", "title": "Second"}]
        });
        let story = normalize(&raw, 4, &settings(4));

        assert_eq!(story.id().as_str(), "story-9");
        assert!(!story.id().is_local());
        assert_eq!(texts(&story), vec!["Plain text.", "Object text."]);
        assert_eq!(story.scenes()[1].title(), "Second");
        assert_eq!(story.scenes()[1].scene_number(), 2);
    }

    #[test]
    fn test_text_blob_bucketed_with_ceiling_division() {
        let raw = json!({"story": "P1\n\nP2\n\nP3\n\nP4\n\nP5"});
        let story = normalize(&raw, 3, &settings(3));

        // ceil(5 / 3) = 2
        assert_eq!(texts(&story), vec!["P1\n\nP2", "P3\n\nP4", "P5"]);
    }

    #[test]
    fn test_text_blob_reconstructs_paragraphs() {
        let blob = "It was dark.\n\nA door appeared.\nIt glowed.\n\nShe opened it.\n\n\nLight poured out.";
        let paragraphs = split_paragraphs(blob);

        for requested in 3..=8 {
            let story = normalize(&json!(blob), requested, &settings(requested as u8));
            let rejoined: Vec<String> = story
                .scenes()
                .iter()
                .flat_map(|s| split_paragraphs(s.text()))
                .collect();
            assert_eq!(rejoined, paragraphs);
            assert!(story.scene_count() <= requested);
        }
    }

    #[test]
    fn test_fallback_scene_is_idempotent() {
        for raw in [json!(""), json!({"story": "  \n\n "}), json!({}), json!(null)] {
            let first = normalize(&raw, 4, &settings(4));
            let second = normalize(&raw, 4, &settings(4));

            assert_eq!(first.scene_count(), 1);
            assert_eq!(first.scenes()[0].text(), FALLBACK_SCENE_TEXT);
            assert_eq!(first.scenes(), second.scenes());
        }
    }

    #[test]
    fn test_nested_story_object() {
        let raw = json!({"story": {"title": "Nested", "scene_1": "Only."}});
        let story = normalize(&raw, 3, &settings(3));
        assert_eq!(story.title(), "Nested");
        assert_eq!(texts(&story), vec!["Only."]);
    }

    #[test]
    fn test_metadata_comes_from_settings() {
        let settings = settings(3).with_genre("mystery").with_art_style("manga");
        let story = normalize(&json!({"scene_1": "A."}), 3, &settings);

        assert_eq!(story.metadata().genre, "mystery");
        assert_eq!(story.metadata().art_style, "manga");
        assert_eq!(story.metadata().total_scenes, 1);
    }

    #[test]
    fn test_image_reference() {
        assert_eq!(
            image_reference("iVBORw0KGgoAAAANSUhEUg").as_deref(),
            Some("data:image/png;base64,iVBORw0KGgoAAAANSUhEUg")
        );
        assert_eq!(
            image_reference("/9j/4AAQSkZJRgABAQ").as_deref(),
            Some("data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ")
        );
        assert_eq!(
            image_reference("https://cdn.example.com/a.png").as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(
            image_reference("/static/scene_1.png").as_deref(),
            Some("/static/scene_1.png")
        );
        assert_eq!(
            image_reference("data:image/webp;base64,AAAA").as_deref(),
            Some("data:image/webp;base64,AAAA")
        );
        assert_eq!(
            image_reference("QUJDREVGR0hJSktMTU5PUFFSU1RVVldY").as_deref(),
            Some("data:image/png;base64,QUJDREVGR0hJSktMTU5PUFFSU1RVVldY")
        );
        assert_eq!(image_reference("   "), None);
    }

    #[test]
    fn test_classify() {
        let task = classify(&json!({"taskId": "t-1", "status": "pending", "estimatedTime": 45}));
        assert_eq!(
            task,
            Submission::Task {
                task_id: TaskId::from_backend("t-1"),
                estimated_time_secs: Some(45)
            }
        );

        assert_eq!(
            classify(&json!({"taskId": "t-1", "scene_1": "A."})),
            Submission::Payload
        );
        assert_eq!(classify(&json!({"scene_1": "A."})), Submission::Payload);
        assert_eq!(classify(&json!("text")), Submission::Payload);
    }

    #[test]
    fn test_parse_status() {
        let report = parse_status(&json!({
            "status": "processing",
            "progress": 60.4,
            "currentStep": "Writing scene 2"
        }))
        .unwrap();
        assert_eq!(report.status, TaskStatus::Processing);
        assert_eq!(report.progress, 60);
        assert_eq!(report.current_step, "Writing scene 2");
        assert!(report.story.is_none());

        let report = parse_status(&json!({"status": "completed", "story": {"scene_1": "A."}})).unwrap();
        assert_eq!(report.progress, 100);
        assert!(report.story.is_some());

        let report = parse_status(&json!({"status": "failed", "error": "GPU out of memory"})).unwrap();
        assert_eq!(report.error.as_deref(), Some("GPU out of memory"));

        assert!(parse_status(&json!({"progress": 10})).is_err());
        assert!(parse_status(&json!({"status": "paused"})).is_err());
        assert!(parse_status(&json!([])).is_err());
    }

    fn preview() -> Story {
        normalize(
            &json!({"scene_1": "First.", "scene_2": "Second.", "scene_3": "Third."}),
            3,
            &settings(3),
        )
    }

    #[test]
    fn test_apply_assets_keyed() {
        let raw = json!({
            "scene_1": {"PIL": "iVBORw0KGgoAAAA", "Text": "First, illustrated."},
            "scene_2": {"PIL": "https://cdn/2.png", "Text": ""},
            "pdfUrl": "/downloads/story.pdf"
        });
        let story = apply_assets(&preview(), &raw).unwrap();

        let first = &story.scenes()[0];
        assert_eq!(first.image_url(), Some("data:image/png;base64,iVBORw0KGgoAAAA"));
        assert_eq!(first.text(), "First, illustrated.");

        let second = &story.scenes()[1];
        assert_eq!(second.image_url(), Some("https://cdn/2.png"));
        assert_eq!(second.text(), "Second.");

        assert!(story.scenes()[2].image_url().is_none());
        assert_eq!(
            story.assets().and_then(|a| a.pdf_url.as_deref()),
            Some("/downloads/story.pdf")
        );
    }

    #[test]
    fn test_apply_assets_list_and_formatted_scenes() {
        let raw = json!({
            "scenes": [
                {"sceneNumber": 2, "imageUrl": "/img/2.png", "audioUrl": "/audio/2.mp3"}
            ]
        });
        let story = apply_assets(&preview(), &raw).unwrap();
        assert_eq!(story.scenes()[1].image_url(), Some("/img/2.png"));
        assert_eq!(story.scenes()[1].audio_url(), Some("/audio/2.mp3"));

        let raw = json!({"formatted_scenes": {"scene_3": {"image": "https://cdn/3.png"}}});
        let story = apply_assets(&preview(), &raw).unwrap();
        assert_eq!(story.scenes()[2].image_url(), Some("https://cdn/3.png"));
    }

    #[test]
    fn test_apply_assets_rejects_empty_payload() {
        assert!(apply_assets(&preview(), &json!({"scene_1": {"Text": "no image"}})).is_err());
        assert!(apply_assets(&preview(), &json!({})).is_err());
    }

    #[test]
    fn test_refinement_text_is_truncated() {
        let raw = json!({"refined_story": "X".repeat(200)});
        let story = apply_refinement(&preview(), &raw, &RefinementPolicy::default()).unwrap();

        let excerpt = "X".repeat(100);
        for scene in story.scenes() {
            assert!(scene.text().contains(&excerpt));
            assert!(!scene.text().contains(&"X".repeat(101)));
        }
        assert_eq!(
            story.scenes()[0].text(),
            format!("First.\n\n[Refined: {}...]", excerpt)
        );
    }

    #[test]
    fn test_refinement_lead_scene_scope() {
        let policy = RefinementPolicy {
            scope: RefinementScope::LeadScene,
            excerpt_chars: 10,
        };
        let raw = json!({"refined_story": "A happier ending for everyone"});
        let story = apply_refinement(&preview(), &raw, &policy).unwrap();

        assert_eq!(story.scenes()[0].text(), "First.\n\n[Refined: A happier ...]");
        assert_eq!(story.scenes()[1].text(), "Second.");
        assert_eq!(story.scenes()[2].text(), "Third.");
    }

    #[test]
    fn test_structured_refinement_replaces_text() {
        let raw = json!({"scene_1": "New first.", "scene_3": "New third."});
        let story = apply_refinement(&preview(), &raw, &RefinementPolicy::default()).unwrap();
        assert_eq!(texts(&story), vec!["New first.", "Second.", "New third."]);
        assert_eq!(story.id(), preview().id());
    }

    #[test]
    fn test_refinement_without_content_is_rejected() {
        let policy = RefinementPolicy::default();
        assert!(apply_refinement(&preview(), &json!({"refined_story": ""}), &policy).is_err());
        assert!(apply_refinement(&preview(), &json!({"ok": true}), &policy).is_err());
    }

    #[test]
    fn test_extract_image() {
        assert_eq!(
            extract_image(&json!({"imageUrl": "https://cdn/new.png"})).as_deref(),
            Some("https://cdn/new.png")
        );
        assert!(extract_image(&json!({"status": "ok"})).is_none());
    }
}
