//! 工作流：按名称注册的多步工具组合，整体只计费一次

pub mod builtin;
pub mod registry;
pub mod types;

pub use builtin::{ContentCreation, InboxTriage, SocialMediaCampaign};
pub use registry::WorkflowRegistry;
pub use types::{FnWorkflow, WorkflowContext, WorkflowError, WorkflowFuture, WorkflowHandler};
