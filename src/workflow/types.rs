//! 工作流类型定义
//!
//! 工作流是按名称注册的多步工具组合：所有步骤共享一个步骤日志与一次计费。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::core::{TaskConfig, TaskError, TaskResult, TokenUsage};
use crate::tools::Toolkit;

/// 工作流注册错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("workflow '{0}' not found")]
    NotFound(String),

    #[error("workflow '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid workflow name '{0}'")]
    InvalidName(String),
}

impl From<WorkflowError> for TaskError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound(name) => TaskError::UnknownOperation(format!("workflow '{name}'")),
            other => TaskError::InvalidInput(other.to_string()),
        }
    }
}

#[derive(Default)]
struct Journal {
    steps: Vec<String>,
    usage: TokenUsage,
}

/// 单次工作流执行的上下文
///
/// `config` 已打上 `parentOperation = execute_workflow` 标签，经它发起的工具调用不会单独计费。
/// 可 Clone：并行分支共享同一份步骤日志。
#[derive(Clone)]
pub struct WorkflowContext {
    pub toolkit: Arc<Toolkit>,
    pub config: TaskConfig,
    journal: Arc<Mutex<Journal>>,
}

impl WorkflowContext {
    pub fn new(toolkit: Arc<Toolkit>, config: TaskConfig) -> Self {
        Self {
            toolkit,
            config,
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    pub fn step(&self, step: impl Into<String>) {
        self.journal.lock().steps.push(step.into());
    }

    /// 合并子步骤的用量与步骤日志
    pub fn absorb<T>(&self, result: &TaskResult<T>) {
        let mut journal = self.journal.lock();
        if let Some(usage) = &result.token_usage {
            journal.usage.absorb(usage);
        }
        journal.steps.extend(result.process_steps.iter().cloned());
    }

    /// 合并并取出数据；子步骤失败时整个工作流失败
    pub fn consume<T>(&self, step: &str, result: TaskResult<T>) -> Result<T, TaskError> {
        self.absorb(&result);
        result.require(step)
    }

    pub fn steps(&self) -> Vec<String> {
        self.journal.lock().steps.clone()
    }

    pub fn usage(&self) -> TokenUsage {
        self.journal.lock().usage
    }
}

/// 工作流处理器
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn run(&self, ctx: &WorkflowContext, inputs: &Value) -> Result<Value, TaskError>;

    fn description(&self) -> &str {
        ""
    }
}

pub type WorkflowFuture = Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send>>;

/// 闭包形式的工作流，供 `register_workflow` 直接注册函数
pub struct FnWorkflow<F> {
    f: F,
    description: String,
}

impl<F> FnWorkflow<F>
where
    F: Fn(WorkflowContext, Value) -> WorkflowFuture + Send + Sync,
{
    pub fn new(description: impl Into<String>, f: F) -> Self {
        Self {
            f,
            description: description.into(),
        }
    }
}

#[async_trait]
impl<F> WorkflowHandler for FnWorkflow<F>
where
    F: Fn(WorkflowContext, Value) -> WorkflowFuture + Send + Sync,
{
    async fn run(&self, ctx: &WorkflowContext, inputs: &Value) -> Result<Value, TaskError> {
        (self.f)(ctx.clone(), inputs.clone()).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// 读取必填的字符串输入
pub fn required_str<'a>(inputs: &'a Value, key: &str) -> Result<&'a str, TaskError> {
    inputs
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TaskError::InvalidInput(format!("missing input '{key}'")))
}

pub fn optional_str<'a>(inputs: &'a Value, key: &str) -> Option<&'a str> {
    inputs
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 字符串数组输入；单个字符串也接受
pub fn string_list(inputs: &Value, key: &str) -> Vec<String> {
    match inputs.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
