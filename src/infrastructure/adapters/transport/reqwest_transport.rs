//! Reqwest Transport - 调用生成后端的 HTTP 客户端
//!
//! 实现 TransportPort trait:
//! - 每个请求独立限时，超时后丢弃在途请求并返回 Timeout
//! - 非 2xx 响应从 JSON 体的 `detail` / `message` / `error` 取错误信息
//! - 连接失败归为 Network，与 Timeout、Http 区分

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use crate::application::ports::{ApiRequest, HttpMethod, TransportError, TransportPort};

/// Reqwest 传输配置
#[derive(Debug, Clone)]
pub struct ReqwestTransportConfig {
    /// 后端基础 URL
    pub base_url: String,
    /// 请求未指定超时时使用的默认超时
    pub timeout: Duration,
    /// 每个请求都携带的默认请求头
    pub headers: Vec<(String, String)>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_millis(120_000),
            headers: Vec::new(),
        }
    }
}

impl ReqwestTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Reqwest 传输
pub struct ReqwestTransport {
    client: Client,
    config: ReqwestTransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: ReqwestTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        tracing::info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout.as_millis() as u64,
            "ReqwestTransport initialized"
        );
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// 默认请求头在前，单次请求的同名头覆盖默认值
    fn headers(&self, request: &ApiRequest) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in self.config.headers.iter().chain(request.headers.iter()) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            map.insert(name, value);
        }

        Ok(map)
    }

    async fn send(&self, request: &ApiRequest, url: &str) -> Result<Value, TransportError> {
        let mut builder = self
            .client
            .request(method(request.method), url)
            .headers(self.headers(request)?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Network(format!("Cannot connect to backend: {}", e))
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        // 错误响应体读取失败时仍按状态码报告
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: body
                    .as_deref()
                    .and_then(error_message)
                    .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16())),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response: {}", e)))?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// 从错误响应体中提取错误信息，解析失败时返回 None
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

#[async_trait]
impl TransportPort for ReqwestTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let url = self.url(&request.path);
        let timeout = request.timeout.unwrap_or(self.config.timeout);

        tracing::debug!(
            method = %request.method,
            url = %url,
            timeout_ms = timeout.as_millis() as u64,
            "Sending backend request"
        );

        // 超时后 future 被丢弃，连接随之关闭
        let result = match tokio::time::timeout(timeout, self.send(&request, &url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match &result {
            Ok(_) => tracing::debug!(method = %request.method, url = %url, "Backend request succeeded"),
            Err(e) => tracing::warn!(method = %request.method, url = %url, error = %e, "Backend request failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ReqwestTransportConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_millis(120_000));
    }

    #[test]
    fn test_url_join() {
        let transport =
            ReqwestTransport::new(ReqwestTransportConfig::new("http://example.com:9000/")).unwrap();
        assert_eq!(
            transport.url("/api/stories/generate"),
            "http://example.com:9000/api/stories/generate"
        );
        assert_eq!(transport.url("health"), "http://example.com:9000/health");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"detail": "bad prompt"}"#).as_deref(), Some("bad prompt"));
        assert_eq!(error_message(r#"{"message": "quota"}"#).as_deref(), Some("quota"));
        assert_eq!(error_message(r#"{"error": "boom"}"#).as_deref(), Some("boom"));
        // FastAPI 的校验错误 detail 是数组
        assert_eq!(error_message(r#"{"detail": [{"loc": ["body"]}]}"#), None);
        assert_eq!(error_message("<html>502</html>"), None);
    }

    #[test]
    fn test_per_call_header_overrides_default() {
        let transport = ReqwestTransport::new(
            ReqwestTransportConfig::default().with_header("X-Client", "taleforge"),
        )
        .unwrap();
        let request = ApiRequest::get("/").with_header("X-Client", "override");

        let headers = transport.headers(&request).unwrap();
        assert_eq!(headers.get("x-client").unwrap(), "override");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let transport = ReqwestTransport::new(ReqwestTransportConfig::default()).unwrap();
        let request = ApiRequest::get("/").with_header("bad header", "x");
        assert!(matches!(
            transport.headers(&request),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
