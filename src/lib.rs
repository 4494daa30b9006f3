//! ContentOps - AI 编排与计费引擎
//!
//! 模块划分：
//! - **cache**: 结果缓存（纯函数缓存键、容量上限、按类别 TTL）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务模型、错误、编排上下文与编排器
//! - **llm**: Provider 能力抽象与实现（OpenAI 兼容 / Mock）
//! - **metering**: 等级闸门、Token 账本、操作策略表与计费包装器
//! - **observability**: tracing 初始化
//! - **rag**: 检索能力边界与进程内检索器
//! - **recovery**: 模型自由文本 → 结构化结果的分层恢复
//! - **tools**: 内容生成 / 分析 / 媒体 / 回复 / 排期工具
//! - **workflow**: 命名工作流注册与内置工作流

pub mod cache;
pub mod config;
pub mod core;
pub mod llm;
pub mod metering;
pub mod observability;
pub mod rag;
pub mod recovery;
pub mod tools;
pub mod workflow;

pub use crate::core::{ContextBuilder, Orchestrator, TaskConfig, TaskError, TaskResult};
