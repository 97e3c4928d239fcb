//! Fake Transport - 用于测试的脚本化传输
//!
//! 按 (方法, 路径) 预置响应序列，不发出任何网络请求。
//! 序列中的响应依次返回，最后一个响应会被重复使用。

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use crate::application::ports::{ApiRequest, HttpMethod, TransportError, TransportPort};

/// 预置响应
#[derive(Debug, Clone)]
pub enum FakeReply {
    Json(Value),
    Error(TransportError),
    /// 延迟后再返回内层响应
    Delayed(Duration, Box<FakeReply>),
}

impl FakeReply {
    pub fn delayed(delay: Duration, reply: FakeReply) -> Self {
        FakeReply::Delayed(delay, Box::new(reply))
    }

    pub fn http_error(status: u16, message: impl Into<String>) -> Self {
        FakeReply::Error(TransportError::Http {
            status,
            message: message.into(),
        })
    }
}

/// 已记录的请求
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

/// Fake Transport
#[derive(Default)]
pub struct FakeTransport {
    routes: DashMap<(HttpMethod, String), VecDeque<FakeReply>>,
    calls: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个响应
    pub fn on(&self, method: HttpMethod, path: impl Into<String>, reply: FakeReply) -> &Self {
        self.routes
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_json(&self, method: HttpMethod, path: impl Into<String>, body: Value) -> &Self {
        self.on(method, path, FakeReply::Json(body))
    }

    /// 所有已记录的请求（按调用顺序）
    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// 指定路径被请求的次数
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }

    fn next_reply(&self, method: HttpMethod, path: &str) -> Option<FakeReply> {
        let mut queue = self.routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl TransportPort for FakeTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        tracing::debug!(method = %request.method, path = %request.path, "FakeTransport: scripted reply");

        self.calls.lock().push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            body: request.body.clone(),
        });

        let mut reply = self
            .next_reply(request.method, &request.path)
            .ok_or_else(|| TransportError::Http {
                status: 404,
                message: format!("no fake route for {} {}", request.method, request.path),
            })?;

        loop {
            match reply {
                FakeReply::Json(value) => return Ok(value),
                FakeReply::Error(error) => return Err(error),
                FakeReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
