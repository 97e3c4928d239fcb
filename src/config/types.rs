//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::application::workflow::WorkflowConfig;
use crate::application::StoryApiConfig;
use crate::infrastructure::adapters::ReqwestTransportConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 生成后端配置
    #[serde(default)]
    pub backend: BackendConfig,

    /// 工作流配置
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 生成后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// 后端基础 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// 请求超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 健康检查超时（毫秒）
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// 健康检查路径
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// 每个请求都携带的额外请求头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_health_timeout_ms() -> u64 {
    5000
}

fn default_health_path() -> String {
    "/".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            health_path: default_health_path(),
            headers: BTreeMap::new(),
        }
    }
}

impl BackendConfig {
    /// 转换为传输层配置
    pub fn transport_config(&self) -> ReqwestTransportConfig {
        ReqwestTransportConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// 转换为 Story API 配置
    pub fn api_config(&self) -> StoryApiConfig {
        StoryApiConfig {
            health_path: self.health_path.clone(),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
