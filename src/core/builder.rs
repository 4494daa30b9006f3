//! 编排上下文构建器：统一的依赖装配
//!
//! 未显式提供的依赖按配置构造：LLM 后端、进程内账本、静态等级表、进程内检索器。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::OrchestrationContext;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::metering::{AccessGate, InMemoryLedger, Meter, StaticTierDirectory, TierDirectory, TokenLedger};
use crate::rag::{InMemoryRetriever, Retriever};
use crate::tools::Toolkit;
use crate::workflow::WorkflowRegistry;

pub struct ContextBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    ledger: Option<Arc<dyn TokenLedger>>,
    directory: Option<Arc<dyn TierDirectory>>,
    retriever: Option<Arc<dyn Retriever>>,
    enable_retriever: bool,
    workflows: Option<WorkflowRegistry>,
}

impl ContextBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            ledger: None,
            directory: None,
            retriever: None,
            enable_retriever: true,
            workflows: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn TokenLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_tier_directory(mut self, directory: Arc<dyn TierDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self.enable_retriever = true;
        self
    }

    /// 不装配检索器（RAG 生成将以检索失败返回）
    pub fn without_retriever(mut self) -> Self {
        self.retriever = None;
        self.enable_retriever = false;
        self
    }

    /// 替换工作流注册表（默认包含内置工作流）
    pub fn with_workflows(mut self, workflows: WorkflowRegistry) -> Self {
        self.workflows = Some(workflows);
        self
    }

    pub fn build(self) -> OrchestrationContext {
        let llm = self
            .llm
            .unwrap_or_else(|| create_llm_from_config(&self.config.llm));
        let ledger = self.ledger.unwrap_or_else(|| {
            tracing::info!(
                default_balance = self.config.ledger.default_balance,
                "Using in-process token ledger"
            );
            Arc::new(InMemoryLedger::new(self.config.ledger.default_balance))
        });
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(StaticTierDirectory::default()));

        let meter = Arc::new(Meter::new(
            AccessGate::new(directory),
            ledger,
            self.config.metering.operation_record_capacity,
        ));
        let toolkit = Arc::new(Toolkit::new(llm.clone(), meter.clone(), &self.config.cache));

        let retriever = match (self.retriever, self.enable_retriever) {
            (Some(retriever), _) => Some(retriever),
            (None, true) => {
                Some(Arc::new(InMemoryRetriever::from_config(llm.clone(), &self.config.rag)) as Arc<dyn Retriever>)
            }
            (None, false) => None,
        };

        tracing::info!(model = llm.model_id(), "orchestration context ready");
        OrchestrationContext {
            llm,
            meter,
            toolkit,
            retriever,
            workflows: Arc::new(self.workflows.unwrap_or_else(WorkflowRegistry::with_builtins)),
            rag: self.config.rag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_build_with_defaults() {
        let ctx = ContextBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .build();
        assert_eq!(ctx.model_id(), "mock-model");
        assert!(ctx.retriever.is_some());
        assert!(ctx.workflows.contains("content-creation"));
    }

    #[test]
    fn test_without_retriever() {
        let ctx = ContextBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .without_retriever()
            .build();
        assert!(ctx.retriever.is_none());
    }
}
