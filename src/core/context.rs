//! 编排上下文：显式构造、按需注入的共享依赖（不使用进程级单例）

use std::sync::Arc;

use crate::config::RagSection;
use crate::llm::LlmClient;
use crate::metering::Meter;
use crate::rag::Retriever;
use crate::tools::Toolkit;
use crate::workflow::WorkflowRegistry;

/// 一次部署内共享的编排依赖；请求处理方持有 `Arc<OrchestrationContext>`
pub struct OrchestrationContext {
    pub llm: Arc<dyn LlmClient>,
    pub meter: Arc<Meter>,
    pub toolkit: Arc<Toolkit>,
    /// 未配置时 RAG 生成返回检索失败
    pub retriever: Option<Arc<dyn Retriever>>,
    pub workflows: Arc<WorkflowRegistry>,
    pub rag: RagSection,
}

impl OrchestrationContext {
    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }
}
