//! Infrastructure Layer - 基础设施层
//!
//! 提供端口的具体实现与后台任务

pub mod adapters;
pub mod events;
pub mod worker;

pub use adapters::{FakeReply, FakeTransport, RecordedRequest, ReqwestTransport, ReqwestTransportConfig};
pub use events::{WorkflowEvent, WorkflowEvents};
pub use worker::{PollError, PollHandle, PollUpdate, StatusPoller, StatusPollerConfig};
