//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（taleforge.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["taleforge", "taleforge.local"];

/// 健康检查超时上限（毫秒）
const MAX_HEALTH_TIMEOUT_MS: u64 = 5000;

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `TALEFORGE_`，层级分隔符 `__`）
/// 2. 配置文件（taleforge.toml 或 taleforge.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `TALEFORGE_BACKEND__BASE_URL=http://story-backend:8000`
/// - `TALEFORGE_BACKEND__TIMEOUT_MS=60000`
/// - `TALEFORGE_WORKFLOW__ART_STYLE_POLICY=substitute`
/// - `TALEFORGE_WORKFLOW__SUPPORTED_ART_STYLES=anime,manga,oil`
/// - `TALEFORGE_LOG__LEVEL=debug`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("backend.base_url", "http://localhost:8000")?
        .set_default("backend.timeout_ms", 120_000)?
        .set_default("backend.health_timeout_ms", 5000)?
        .set_default("backend.health_path", "/")?
        .set_default("workflow.poll_interval_ms", 2000)?
        .set_default("workflow.min_idea_chars", 10)?
        .set_default("workflow.min_scenes", 3)?
        .set_default("workflow.max_scenes", 8)?
        .set_default("workflow.default_art_style", "anime")?
        .set_default("workflow.art_style_policy", "reject")?
        .set_default("workflow.refinement_scope", "all_scenes")?
        .set_default("workflow.refine_excerpt_chars", 100)?
        .set_default("workflow.sync_scene_edits", false)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("TALEFORGE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("workflow.supported_art_styles"),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    let workflow = &config.workflow;

    if backend.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Backend base URL cannot be empty".to_string(),
        ));
    }

    if backend.timeout_ms == 0 || backend.health_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Backend timeouts cannot be 0".to_string(),
        ));
    }

    if backend.health_timeout_ms > MAX_HEALTH_TIMEOUT_MS {
        return Err(ConfigError::ValidationError(format!(
            "Health check timeout cannot exceed {}ms",
            MAX_HEALTH_TIMEOUT_MS
        )));
    }

    if workflow.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Poll interval cannot be 0".to_string(),
        ));
    }

    if workflow.min_scenes < 3 || workflow.min_scenes > workflow.max_scenes || workflow.max_scenes > 8 {
        return Err(ConfigError::ValidationError(format!(
            "Scene bounds must satisfy 3 <= min <= max <= 8 (got {}..{})",
            workflow.min_scenes, workflow.max_scenes
        )));
    }

    if workflow.supported_art_styles.is_empty() {
        return Err(ConfigError::ValidationError(
            "At least one art style must be supported".to_string(),
        ));
    }

    if !workflow.supports_art_style(&workflow.default_art_style) {
        return Err(ConfigError::ValidationError(format!(
            "Default art style '{}' is not in the supported list",
            workflow.default_art_style
        )));
    }

    if workflow.refine_excerpt_chars == 0 {
        return Err(ConfigError::ValidationError(
            "Refinement excerpt length cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Backend: {}", config.backend.base_url);
    tracing::info!("Request Timeout: {}ms", config.backend.timeout_ms);
    tracing::info!(
        "Health Check: {} ({}ms)",
        config.backend.health_path,
        config.backend.health_timeout_ms
    );
    tracing::info!("Extra Headers: {}", config.backend.headers.len());
    tracing::info!("Poll Interval: {}ms", config.workflow.poll_interval_ms);
    tracing::info!(
        "Scenes: {}..={}",
        config.workflow.min_scenes,
        config.workflow.max_scenes
    );
    tracing::info!(
        "Art Styles: {} (default {}, policy {:?})",
        config.workflow.supported_art_styles.join(", "),
        config.workflow.default_art_style,
        config.workflow.art_style_policy
    );
    tracing::info!("Refinement Scope: {:?}", config.workflow.refinement_scope);
    tracing::info!("Sync Scene Edits: {}", config.workflow.sync_scene_edits);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::workflow::{ArtStylePolicy, RefinementScope};
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_base_url() {
        let mut config = AppConfig::default();
        config.backend.base_url = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_long_health_timeout() {
        let mut config = AppConfig::default();
        config.backend.health_timeout_ms = 10_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_scene_bounds() {
        let mut config = AppConfig::default();
        config.workflow.min_scenes = 6;
        config.workflow.max_scenes = 4;
        assert!(validate_config(&config).is_err());

        config.workflow.min_scenes = 3;
        config.workflow.max_scenes = 12;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_unknown_default_style() {
        let mut config = AppConfig::default();
        config.workflow.default_art_style = "watercolor".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
base_url = "http://story-backend:9000"
timeout_ms = 30000

[backend.headers]
X-Api-Key = "secret"

[workflow]
poll_interval_ms = 500
supported_art_styles = ["anime", "manga"]
art_style_policy = "substitute"
refinement_scope = "lead_scene"
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.backend.base_url, "http://story-backend:9000");
        assert_eq!(config.backend.timeout_ms, 30_000);
        assert_eq!(config.backend.health_timeout_ms, 5000);
        // 请求头名大小写不敏感
        assert!(config
            .backend
            .headers
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case("x-api-key") && value == "secret"));
        assert_eq!(config.workflow.poll_interval_ms, 500);
        assert_eq!(config.workflow.supported_art_styles, vec!["anime", "manga"]);
        assert_eq!(config.workflow.art_style_policy, ArtStylePolicy::Substitute);
        assert_eq!(config.workflow.refinement_scope, RefinementScope::LeadScene);
        assert_eq!(config.workflow.min_idea_chars, 10);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[workflow]\nrefine_excerpt_chars = 0").unwrap();

        assert!(matches!(
            load_config_from_path(Some(file.path())),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
