//! Events - 工作流事件发布

mod publisher;

pub use publisher::{WorkflowEvent, WorkflowEvents};
