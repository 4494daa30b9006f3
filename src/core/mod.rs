//! 核心编排层：任务模型、错误、编排上下文与构建器、编排器

pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod task;

pub use builder::ContextBuilder;
pub use context::OrchestrationContext;
pub use error::{ErrorKind, TaskError};
pub use orchestrator::{BatchItem, Orchestrator, RagAnswer};
pub use task::{
    BatchReport, TaskConfig, TaskResult, TaskType, TokenUsage, META_OPERATION_ID, META_PARENT_OPERATION,
    OPERATION_COST,
};
