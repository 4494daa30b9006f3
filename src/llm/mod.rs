//! LLM 层：Provider 能力抽象与实现（OpenAI 兼容 / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, UsageCounters};
pub use traits::{GenerateOptions, Generation, LlmClient, LlmError};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    if provider == "openai" && api_key.is_some() {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.model);
        Arc::new(
            OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, api_key.as_deref())
                .with_embedding_model(cfg.embedding_model.clone())
                .with_timeout(Duration::from_secs(cfg.timeouts.request)),
        )
    } else {
        tracing::warn!("No API key set or provider is '{}', using Mock LLM", provider);
        Arc::new(MockLlmClient::new())
    }
}
