//! OpenAI 兼容 API 客户端
//!
//! 对话与向量化通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 图像分析直接以 reqwest 发送带 image_url 内容块的 chat/completions 请求。
//! 每个请求都包一层超时，超时转为 LlmError::Timeout。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{GenerateOptions, Generation, LlmClient, LlmError, Message, Role};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: UsageCounters,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let api_base = base_url.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string();

        let config = OpenAIConfig::new()
            .with_api_base(api_base.clone())
            .with_api_key(api_key.clone());

        Self {
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            api_base,
            api_key,
            model: model.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(60),
            usage: UsageCounters::new(),
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, LlmError>
    where
        F: std::future::Future<Output = Result<T, LlmError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
    }

    fn to_openai_messages(
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let invalid = |e: async_openai::error::OpenAIError| LlmError::InvalidResponse(e.to_string());
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                })
            })
            .collect()
    }

    async fn chat_inner(
        &self,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(opts.model.clone().unwrap_or_else(|| self.model.clone()))
            .messages(Self::to_openai_messages(messages)?);
        if let Some(temperature) = opts.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = opts.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens as u64, u.completion_tokens as u64))
            .unwrap_or((0, 0));
        self.usage.add(prompt_tokens, completion_tokens);

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(Generation {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }

    async fn embed_inner(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }

    async fn image_inner(
        &self,
        image_url: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        let body = json!({
            "model": opts.model.clone().unwrap_or_else(|| self.model.clone()),
            "max_tokens": opts.max_tokens.unwrap_or(1000),
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::ApiError(format!("HTTP {status}: {payload}")));
        }

        let prompt_tokens = payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let completion_tokens = payload["usage"]["completion_tokens"].as_u64().unwrap_or(0);
        self.usage.add(prompt_tokens, completion_tokens);

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".to_string()))?
            .to_string();

        Ok(Generation {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_chat(
        &self,
        messages: &[Message],
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        self.with_deadline(self.chat_inner(messages, opts)).await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        self.with_deadline(self.embed_inner(text)).await
    }

    async fn analyze_image(
        &self,
        image_url: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        self.with_deadline(self.image_inner(image_url, prompt, opts)).await
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion_keeps_roles() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let converted = OpenAiClient::to_openai_messages(&messages).unwrap();
        assert_eq!(converted.len(), 3);
        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(converted[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(converted[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_usage_accumulates() {
        let usage = UsageCounters::new();
        usage.add(10, 5);
        usage.add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}
