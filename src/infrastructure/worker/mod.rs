//! Worker Layer - Background Task Processing
//!
//! 实现 StatusPoller，轮询后端异步任务

mod status_poller;

pub use status_poller::{PollError, PollHandle, PollUpdate, StatusPoller, StatusPollerConfig};
