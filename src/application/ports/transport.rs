//! Transport Port - 后端 HTTP 请求抽象
//!
//! 定义与生成后端通信的抽象接口，具体实现在 infrastructure/adapters 层。
//! 端口本身不做重试，重试策略属于编排器。

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// 传输层错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// HTTP 状态码（仅 Http 错误）
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 面向用户的简短描述
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Timeout(_) => "Request timed out. Please try again.".to_string(),
            TransportError::Network(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            TransportError::Http { message, .. } => message.clone(),
            TransportError::MalformedBody(_) => {
                "The server returned an unexpected response.".to_string()
            }
            TransportError::InvalidRequest(_) => "The request could not be sent.".to_string(),
        }
    }
}

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次后端请求
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// 相对于 base URL 的路径
    pub path: String,
    /// JSON 请求体
    pub body: Option<Value>,
    /// 额外请求头（覆盖默认请求头）
    pub headers: Vec<(String, String)>,
    /// 本次请求的超时，None 表示使用传输层默认值
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Transport Port
///
/// 发出限时的 HTTP 请求，并把所有失败归一为 [`TransportError`]
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// 执行请求，返回解析后的 JSON（空响应体为 `null`）
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError>;
}
