//! Transport Adapter - 后端 HTTP 传输实现

mod fake_transport;
mod reqwest_transport;

pub use fake_transport::{FakeReply, FakeTransport, RecordedRequest};
pub use reqwest_transport::{ReqwestTransport, ReqwestTransportConfig};
