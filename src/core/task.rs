//! 任务数据模型：TaskConfig / TaskResult / TokenUsage / TaskType / BatchReport

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{ErrorKind, TaskError};
use crate::llm::Generation;
use crate::metering::Feature;

/// 每个计费操作的固定价格
pub const OPERATION_COST: u64 = 1;

/// metadata 中的计费标签
pub const META_OPERATION_ID: &str = "operationId";
pub const META_PARENT_OPERATION: &str = "parentOperation";

fn default_true() -> bool {
    true
}

/// 单次调用的配置；嵌套调用中除 metadata 的标签外保持不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub user_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub enable_rag: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: None,
            model: None,
            temperature: None,
            max_tokens: None,
            use_cache: true,
            enable_rag: false,
            metadata: Map::new(),
        }
    }

    pub fn with_organization(mut self, org_id: impl Into<String>) -> Self {
        self.organization_id = Some(org_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_rag(mut self) -> Self {
        self.enable_rag = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 上游传入的操作 ID
    pub fn operation_id(&self) -> Option<&str> {
        self.metadata.get(META_OPERATION_ID).and_then(Value::as_str)
    }

    /// 调用方（父操作）名称
    pub fn parent_operation(&self) -> Option<&str> {
        self.metadata.get(META_PARENT_OPERATION).and_then(Value::as_str)
    }

    /// 复制一份配置并打上子调用标签
    pub fn tagged(&self, operation_id: &str, parent_operation: &str) -> Self {
        let mut next = self.clone();
        next.metadata
            .insert(META_OPERATION_ID.to_string(), Value::from(operation_id));
        next.metadata
            .insert(META_PARENT_OPERATION.to_string(), Value::from(parent_operation));
        next
    }
}

/// Token 用量；cost 只可能是 0 或 OPERATION_COST
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub cost: u64,
}

impl TokenUsage {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_generation(generation: &Generation) -> Self {
        Self {
            prompt: generation.prompt_tokens,
            completion: generation.completion_tokens,
            total: generation.prompt_tokens + generation.completion_tokens,
            cost: 0,
        }
    }

    /// 累加 token 数；cost 不累加（由计费层统一设置）
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

/// 任务结果
///
/// 不变量：success = false 时没有发生账本扣费；token_usage.cost ∈ {0, 1}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub token_usage: Option<TokenUsage>,
    pub execution_time_ms: u64,
    pub process_steps: Vec<String>,
    /// 结果来自缓存，未产生 provider 调用
    #[serde(default)]
    pub cached: bool,
}

impl<T> TaskResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            token_usage: None,
            execution_time_ms: 0,
            process_steps: Vec::new(),
            cached: false,
        }
    }

    pub fn failure(err: &TaskError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            token_usage: Some(TokenUsage::zero()),
            execution_time_ms: 0,
            process_steps: Vec::new(),
            cached: false,
        }
    }

    pub fn from_cache(data: T) -> Self {
        Self {
            token_usage: Some(TokenUsage::zero()),
            cached: true,
            ..Self::ok(data)
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.process_steps = steps;
        self
    }

    pub fn step(&mut self, step: impl Into<String>) {
        self.process_steps.push(step.into());
    }

    pub fn cost(&self) -> u64 {
        self.token_usage.map(|u| u.cost).unwrap_or(0)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskResult<U> {
        TaskResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_kind: self.error_kind,
            token_usage: self.token_usage,
            execution_time_ms: self.execution_time_ms,
            process_steps: self.process_steps,
            cached: self.cached,
        }
    }

    /// 作为工作流步骤消费结果：失败转为 StepFailed
    pub fn require(self, step: &str) -> Result<T, TaskError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(TaskError::StepFailed {
                step: step.to_string(),
                kind: self.error_kind.unwrap_or(ErrorKind::ProviderFailure),
                message: self.error.unwrap_or_else(|| "no data returned".to_string()),
            }),
        }
    }
}

impl<T: Serialize> TaskResult<T> {
    /// 擦除数据类型，供编排层按 JSON 汇总
    pub fn into_json(self) -> TaskResult<Value> {
        let data = self.data.as_ref().map(serde_json::to_value).transpose();
        match data {
            Ok(data) => TaskResult {
                data,
                ..self.map(|_| Value::Null)
            },
            Err(e) => {
                let mut failed = TaskResult::failure(&TaskError::InvalidInput(e.to_string()));
                failed.process_steps = self.process_steps;
                failed.step("Result serialization failed");
                failed
            }
        }
    }
}

/// 编排器支持的任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    ContentGeneration,
    ContentAnalysis,
    ScheduleOptimization,
    Workflow,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::ContentGeneration,
        TaskType::ContentAnalysis,
        TaskType::ScheduleOptimization,
        TaskType::Workflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ContentGeneration => "content-generation",
            TaskType::ContentAnalysis => "content-analysis",
            TaskType::ScheduleOptimization => "schedule-optimization",
            TaskType::Workflow => "workflow",
        }
    }

    /// 分级权限表中对应的功能
    pub fn feature(&self) -> Feature {
        match self {
            TaskType::ContentGeneration => Feature::ContentGeneration,
            TaskType::ContentAnalysis => Feature::ContentAnalysis,
            TaskType::ScheduleOptimization => Feature::ScheduleOptimization,
            TaskType::Workflow => Feature::Workflow,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::UnknownOperation(format!("task type '{s}'")))
    }
}

/// 批量操作的逐项结果与成功 / 失败计数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport<T> {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<TaskResult<T>>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            items: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn push(&mut self, result: TaskResult<T>) {
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(result);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> FromIterator<TaskResult<T>> for BatchReport<T> {
    fn from_iter<I: IntoIterator<Item = TaskResult<T>>>(iter: I) -> Self {
        let mut report = BatchReport::default();
        for result in iter {
            report.push(result);
        }
        report
    }
}
