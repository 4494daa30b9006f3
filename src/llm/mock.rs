//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按「子串规则」返回预设文本：第一条命中 prompt 的规则生效，未命中时返回默认回复。
//! 记录调用次数与 prompt，向量化返回确定性的词袋哈希向量。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{GenerateOptions, Generation, LlmClient, LlmError, Message};

const EMBEDDING_DIM: usize = 64;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Mock 客户端：子串规则 → 固定回复 / 固定失败
#[derive(Debug)]
pub struct MockLlmClient {
    rules: Vec<(String, Reply)>,
    default_reply: String,
    model: String,
    calls: AtomicUsize,
    embed_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: "Mock response".to_string(),
            model: "mock-model".to_string(),
            calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 未命中任何规则时的回复
    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// prompt 包含 pattern（不区分大小写）时返回 reply
    pub fn on(mut self, pattern: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules
            .push((pattern.into().to_lowercase(), Reply::Text(reply.into())));
        self
    }

    /// prompt 包含 pattern 时返回 provider 错误
    pub fn fail_on(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into().to_lowercase();
        let msg = format!("mock failure for '{pattern}'");
        self.rules.push((pattern, Reply::Fail(msg)));
        self
    }

    /// 文本 / 对话 / 图像调用总次数（不含向量化）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// 按调用顺序记录的完整 prompt
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn respond(&self, prompt: String) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = prompt.to_lowercase();
        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Text(self.default_reply.clone()));
        let prompt_tokens = (prompt.len() / 4) as u64;
        self.prompts.lock().push(prompt);

        match reply {
            Reply::Text(text) => Ok(Generation {
                completion_tokens: (text.len() / 4) as u64,
                prompt_tokens,
                text,
            }),
            Reply::Fail(msg) => Err(LlmError::Unavailable(msg)),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.respond(prompt)
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words_embedding(text))
    }

    async fn analyze_image(
        &self,
        image_url: &str,
        prompt: &str,
        _opts: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        self.respond(format!("{prompt}\n[image] {image_url}"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// 词袋哈希向量（L2 归一化），相同词汇的文本余弦相似度更高
fn bag_of_words_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(5381u64, |h, b| h.wrapping_mul(33) ^ u64::from(b));
        vector[(hash % EMBEDDING_DIM as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let mock = MockLlmClient::new()
            .on("outline", "1. Intro")
            .on("draft", "Body")
            .with_default("fallback");
        let opts = GenerateOptions::default();

        let out = mock.generate_text("Create an OUTLINE then a draft", &opts).await.unwrap();
        assert_eq!(out.text, "1. Intro");
        let out = mock.generate_text("nothing here", &opts).await.unwrap();
        assert_eq!(out.text, "fallback");
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_rule_surfaces_error() {
        let mock = MockLlmClient::new().fail_on("boom");
        let err = mock
            .generate_text("this will boom", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_is_deterministic_and_normalized() {
        let mock = MockLlmClient::new();
        let a = mock.embed_text("coffee brewing guide").await.unwrap();
        let b = mock.embed_text("coffee brewing guide").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert_eq!(mock.embed_calls(), 2);
    }
}
