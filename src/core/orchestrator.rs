//! 编排器：任务路由、RAG 生成、多工具并行分析、命名工作流与批量执行
//!
//! 每个入口都经过计费包装器：等级闸门 → 余额检查 → 分派 → 成功后扣费一次。
//! 分派前即可判定的失败（未知任务类型、未知工作流、缺少必填输入）直接返回，不计费。

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::core::{
    BatchReport, ErrorKind, OrchestrationContext, TaskConfig, TaskError, TaskResult, TaskType, TokenUsage,
};
use crate::metering::{ops, Feature};
use crate::rag::{RetrievalError, SearchFilters};
use crate::recovery::TextContent;
use crate::tools::AnalysisKind;
use crate::workflow::types::{optional_str, required_str, string_list};
use crate::workflow::{WorkflowContext, WorkflowError, WorkflowHandler};

const DEFAULT_CONTENT_TYPE: &str = "article";
const DEFAULT_ANALYSIS: &str = "sentiment";
const DEFAULT_PLATFORM: &str = "general";

/// RAG 生成结果：正文与引用的文档来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagAnswer {
    pub title: String,
    pub content: String,
    pub sources: Vec<String>,
}

/// 批量执行中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub task_type: String,
    #[serde(default)]
    pub inputs: Value,
    pub config: TaskConfig,
}

impl BatchItem {
    pub fn new(task_type: impl Into<String>, inputs: Value, config: TaskConfig) -> Self {
        Self {
            task_type: task_type.into(),
            inputs,
            config,
        }
    }
}

/// execute_task 在计费之前解析出的分派目标
#[derive(Debug, Clone)]
enum Route {
    Generate { prompt: String, content_type: String },
    Post { topic: String, platform: String },
    RagGenerate { prompt: String },
    Analyze { kind: AnalysisKind, content: String, platform: String },
    MultiAnalyze { content: String, kinds: Vec<String> },
    Schedule { platform: String, audience: Option<String> },
    Workflow { name: String, inputs: Value },
}

impl Route {
    /// 等级闸门按实际分派目标取功能
    fn feature(&self) -> Feature {
        match self {
            Route::Generate { .. } | Route::Post { .. } => Feature::ContentGeneration,
            Route::RagGenerate { .. } => Feature::RagGeneration,
            Route::Analyze { .. } => Feature::ContentAnalysis,
            Route::MultiAnalyze { .. } => Feature::MultiToolAnalysis,
            Route::Schedule { .. } => Feature::ScheduleOptimization,
            Route::Workflow { .. } => Feature::Workflow,
        }
    }
}

/// 顶层编排器；Clone 代价为一次 Arc 复制
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<OrchestrationContext>,
}

impl Orchestrator {
    pub fn new(ctx: OrchestrationContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn from_shared(ctx: Arc<OrchestrationContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<OrchestrationContext> {
        &self.ctx
    }

    /// 按任务类型路由执行：content-generation / content-analysis / schedule-optimization / workflow
    pub async fn execute_task(&self, task_type: &str, inputs: Value, config: &TaskConfig) -> TaskResult<Value> {
        let route = match self.route(task_type, &inputs, config) {
            Ok(route) => route,
            Err(err) => {
                tracing::warn!(task_type, user_id = %config.user_id, "task rejected before dispatch: {}", err);
                return TaskResult::failure(&err);
            }
        };
        tracing::info!(task_type, user_id = %config.user_id, feature = %route.feature(), "executing task");

        let spec = ops::EXECUTE_TASK.with_feature(route.feature());
        self.ctx
            .meter
            .run(&spec, config, |child| async move { Ok::<_, TaskError>(self.dispatch(route, &child).await) })
            .await
    }

    /// 可取消的 execute_task：令牌先触发时放弃执行，返回 Cancelled 且不计费
    pub async fn execute_task_cancellable(
        &self,
        task_type: &str,
        inputs: Value,
        config: &TaskConfig,
        cancel: CancellationToken,
    ) -> TaskResult<Value> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(task_type, user_id = %config.user_id, "task cancelled by caller");
                TaskResult::failure(&TaskError::Cancelled)
            }
            result = self.execute_task(task_type, inputs, config) => result,
        }
    }

    fn route(&self, task_type: &str, inputs: &Value, config: &TaskConfig) -> Result<Route, TaskError> {
        match task_type.parse::<TaskType>()? {
            TaskType::ContentGeneration => {
                let prompt = required_str(inputs, "prompt")
                    .or_else(|_| required_str(inputs, "topic"))?
                    .to_string();
                if config.enable_rag {
                    return Ok(Route::RagGenerate { prompt });
                }
                if let Some(platform) = optional_str(inputs, "platform") {
                    return Ok(Route::Post {
                        topic: prompt,
                        platform: platform.to_string(),
                    });
                }
                let content_type = optional_str(inputs, "contentType")
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                Ok(Route::Generate { prompt, content_type })
            }
            TaskType::ContentAnalysis => {
                let content = required_str(inputs, "content")?.to_string();
                let mut kinds = string_list(inputs, "analysisTypes");
                if kinds.is_empty() {
                    kinds = string_list(inputs, "analysisType");
                }
                if kinds.is_empty() {
                    kinds.push(DEFAULT_ANALYSIS.to_string());
                }
                if let [only] = kinds.as_slice() {
                    if let Ok(kind) = only.parse::<AnalysisKind>() {
                        let platform = optional_str(inputs, "platform").unwrap_or(DEFAULT_PLATFORM).to_string();
                        return Ok(Route::Analyze { kind, content, platform });
                    }
                }
                if !kinds.iter().any(|k| k.parse::<AnalysisKind>().is_ok()) {
                    return Err(TaskError::UnknownOperation(format!(
                        "unsupported analysis types: {}",
                        kinds.join(", ")
                    )));
                }
                Ok(Route::MultiAnalyze { content, kinds })
            }
            TaskType::ScheduleOptimization => Ok(Route::Schedule {
                platform: required_str(inputs, "platform")?.to_string(),
                audience: optional_str(inputs, "audience").map(str::to_string),
            }),
            TaskType::Workflow => {
                let name = required_str(inputs, "workflow").or_else(|_| required_str(inputs, "name"))?;
                if !self.ctx.workflows.contains(name) {
                    return Err(WorkflowError::NotFound(name.to_string()).into());
                }
                let inputs = inputs.get("inputs").cloned().unwrap_or_else(|| inputs.clone());
                Ok(Route::Workflow {
                    name: name.to_string(),
                    inputs,
                })
            }
        }
    }

    async fn dispatch(&self, route: Route, config: &TaskConfig) -> TaskResult<Value> {
        let kit = &self.ctx.toolkit;
        match route {
            Route::Generate { prompt, content_type } => kit
                .content
                .generate_content(&prompt, &content_type, config)
                .await
                .into_json(),
            Route::Post { topic, platform } => kit.content.generate_post(&topic, &platform, config).await.into_json(),
            Route::RagGenerate { prompt } => self.generate_with_rag(&prompt, config).await.into_json(),
            Route::Analyze { kind, content, platform } => kit.analysis.analyze(kind, &content, &platform, config).await,
            Route::MultiAnalyze { content, kinds } => self.multi_tool_analysis(&content, &kinds, config).await,
            Route::Schedule { platform, audience } => kit
                .schedule
                .optimize_schedule(&platform, audience.as_deref(), config)
                .await
                .into_json(),
            Route::Workflow { name, inputs } => self.execute_workflow(&name, inputs, config).await,
        }
    }

    /// 检索增强生成：取回 top-K 文档拼入 prompt，再交给内容生成；整次调用只计费一次
    pub async fn generate_with_rag(&self, prompt: &str, config: &TaskConfig) -> TaskResult<RagAnswer> {
        self.ctx
            .meter
            .run(&ops::GENERATE_WITH_RAG, config, |child| async move {
                let retriever = self
                    .ctx
                    .retriever
                    .as_ref()
                    .ok_or_else(|| RetrievalError::Unavailable("no retriever configured".to_string()))?;

                let filters = SearchFilters::new(self.ctx.rag.top_k).with_min_score(self.ctx.rag.min_score);
                let documents = retriever
                    .similarity_search(prompt, &filters, &child.user_id, child.organization_id.as_deref())
                    .await?;
                tracing::debug!(count = documents.len(), "retrieved context documents");

                let augmented = if documents.is_empty() {
                    prompt.to_string()
                } else {
                    format!(
                        "Use the reference material below where it is relevant. \
                         Do not invent facts beyond it.\n\n{}\n\nTask:\n{prompt}",
                        retriever.generate_context(&documents)
                    )
                };
                let mut sources: Vec<String> = Vec::new();
                for doc in &documents {
                    if !sources.contains(&doc.source_id) {
                        sources.push(doc.source_id.clone());
                    }
                }

                let generated = self
                    .ctx
                    .toolkit
                    .content
                    .generate_content(&augmented, DEFAULT_CONTENT_TYPE, &child)
                    .await;

                let mut steps = vec![format!("Retrieved {} documents", documents.len())];
                if documents.is_empty() {
                    steps.push("No relevant context found; generating without it".to_string());
                }
                steps.extend(generated.process_steps.iter().cloned());
                let answer = generated.map(|TextContent { title, content }| RagAnswer {
                    title,
                    content,
                    sources,
                });
                Ok::<_, TaskError>(TaskResult { process_steps: steps, ..answer })
            })
            .await
    }

    /// 多工具并行分析：各分析类型独立调用，部分成功即整体成功，全部失败才失败
    pub async fn multi_tool_analysis(
        &self,
        content: &str,
        analysis_types: &[String],
        config: &TaskConfig,
    ) -> TaskResult<Value> {
        self.ctx
            .meter
            .run(&ops::MULTI_TOOL_ANALYSIS, config, |child| async move {
                let mut steps = Vec::new();
                let mut kinds = BTreeSet::new();
                for name in analysis_types {
                    match name.parse::<AnalysisKind>() {
                        Ok(kind) => {
                            kinds.insert(kind);
                        }
                        Err(_) => steps.push(format!("Skipped unsupported analysis type: {name}")),
                    }
                }
                if kinds.is_empty() {
                    return Err(TaskError::InvalidInput(
                        "no supported analysis types requested".to_string(),
                    ));
                }

                let analyzer = &self.ctx.toolkit.analysis;
                let outcomes = join_all(
                    kinds
                        .iter()
                        .map(|kind| analyzer.analyze(*kind, content, DEFAULT_PLATFORM, &child)),
                )
                .await;

                let mut results = Map::new();
                let mut usage = TokenUsage::zero();
                let mut all_cached = true;
                for (kind, outcome) in kinds.iter().zip(outcomes) {
                    if let Some(sub) = &outcome.token_usage {
                        usage.absorb(sub);
                    }
                    steps.extend(outcome.process_steps.iter().cloned());
                    all_cached &= outcome.cached;
                    match (outcome.success, outcome.data) {
                        (true, Some(data)) => {
                            results.insert(kind.as_str().to_string(), data);
                        }
                        _ => {
                            let reason = outcome.error.unwrap_or_default();
                            tracing::warn!(analysis = %kind, "analysis failed: {}", reason);
                            steps.push(format!("{kind} analysis failed: {reason}"));
                        }
                    }
                }

                if results.is_empty() {
                    return Err(TaskError::StepFailed {
                        step: "multi_tool_analysis".to_string(),
                        kind: ErrorKind::ProviderFailure,
                        message: format!("all {} analyses failed", kinds.len()),
                    });
                }
                steps.push(format!("Completed {} of {} analyses", results.len(), kinds.len()));

                let data = Value::Object(results);
                let result = if all_cached {
                    TaskResult::from_cache(data)
                } else {
                    TaskResult::ok(data)
                };
                Ok::<_, TaskError>(result.with_usage(usage).with_steps(steps))
            })
            .await
    }

    /// 执行命名工作流；所有内部步骤共享一份步骤日志，整体只计费一次
    pub async fn execute_workflow(&self, name: &str, inputs: Value, config: &TaskConfig) -> TaskResult<Value> {
        let handler = match self.ctx.workflows.get(name) {
            Ok(handler) => handler,
            Err(err) => {
                tracing::warn!(workflow = name, user_id = %config.user_id, "{}", err);
                return TaskResult::failure(&err.into());
            }
        };
        let toolkit = self.ctx.toolkit.clone();

        self.ctx
            .meter
            .run(&ops::EXECUTE_WORKFLOW, config, |child| async move {
                let wf = WorkflowContext::new(toolkit, child);
                wf.step(format!("Running workflow '{name}'"));
                match handler.run(&wf, &inputs).await {
                    Ok(output) => Ok::<_, TaskError>(TaskResult::ok(output)
                        .with_usage(wf.usage())
                        .with_steps(wf.steps())),
                    Err(err) => {
                        tracing::warn!(workflow = name, "workflow failed: {}", err);
                        let mut failed = TaskResult::failure(&err);
                        failed.token_usage = Some(wf.usage());
                        failed.process_steps = wf.steps();
                        Ok(failed)
                    }
                }
            })
            .await
    }

    /// 运行期注册新工作流
    pub fn register_workflow(&self, name: &str, handler: Arc<dyn WorkflowHandler>) -> Result<(), WorkflowError> {
        self.ctx.workflows.register(name, handler)
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.ctx.workflows.names()
    }

    /// 批量执行：各项独立计费、并发执行；失败只计数，不重试
    pub async fn execute_batch(&self, items: Vec<BatchItem>) -> BatchReport<Value> {
        let total = items.len();
        let results = join_all(
            items
                .into_iter()
                .map(|item| async move { self.execute_task(&item.task_type, item.inputs, &item.config).await }),
        )
        .await;
        let report: BatchReport<Value> = results.into_iter().collect();
        tracing::info!(total, succeeded = report.succeeded, failed = report.failed, "batch finished");
        report
    }
}
