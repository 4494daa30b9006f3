//! LLM 能力抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：文本生成、对话生成、向量化、图像分析。
//! 本层不做重试与缓存；超时由具体后端负责，失败统一以 LlmError 抛出。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::TaskConfig;
use crate::llm::Message;

/// Provider 调用失败（编排层一律视为「provider 不可用」，不计费）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider request timed out after {0}s")]
    Timeout(u64),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider API error: {0}")]
    ApiError(String),
}

/// 单次调用的生成参数（来自 TaskConfig 中影响输出的字段）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 系统提示；None 时由后端决定
    pub system: Option<String>,
}

impl GenerateOptions {
    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// 一次生成的文本与 token 统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Provider 能力 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 对话生成
    async fn generate_chat(
        &self,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError>;

    /// 单轮文本生成；默认包装为 system + user 两条消息
    async fn generate_text(&self, prompt: &str, opts: &GenerateOptions) -> Result<Generation, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &opts.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));
        self.generate_chat(&messages, opts).await
    }

    /// 文本向量化
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// 图像分析：对 image_url 指向的图片按 prompt 生成描述
    async fn analyze_image(
        &self,
        image_url: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError>;

    /// 当前默认模型标识
    fn model_id(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
