//! 工具公共运行时
//!
//! 每个工具实例持有一个 `ToolRuntime`：共享的 provider、计费包装器，以及本工具独占的结果缓存。
//! `invoke` 串起 计费判定 → 缓存查找 → 生成 → 缓存写入；`structured` 串起 生成 → 结构化恢复。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{cache_key, ResultCache};
use crate::core::{TaskConfig, TaskError, TaskResult, TokenUsage};
use crate::llm::{GenerateOptions, Generation, LlmClient, Message};
use crate::metering::{ops, Meter, OperationSpec};
use crate::recovery::{recover, Recoverable, Recovered};

/// 单条输入的最大字符数
pub const MAX_INPUT_CHARS: usize = 20_000;

pub(crate) const SYSTEM_PROMPT: &str =
    "You are a senior social media strategist and copywriter. Follow the requested format exactly.";

/// 输入清洗：去控制字符与首尾空白、限制长度；清洗后为空视为非法输入
pub fn sanitize(text: &str) -> Result<String, TaskError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(TaskError::InvalidInput("input is empty".to_string()));
    }
    Ok(crate::recovery::extract::truncate_chars(cleaned, MAX_INPUT_CHARS))
}

pub struct ToolRuntime {
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) meter: Arc<Meter>,
    pub(crate) cache: ResultCache<Value>,
}

impl ToolRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, meter: Arc<Meter>, capacity: usize, ttl: Duration) -> Self {
        Self {
            llm,
            meter,
            cache: ResultCache::new(capacity, ttl),
        }
    }

    pub fn cache(&self) -> &ResultCache<Value> {
        &self.cache
    }

    /// 计费 + 缓存包装：`produce` 只在缓存未命中时调用
    pub async fn invoke<T, F, Fut>(
        &self,
        spec: &OperationSpec,
        config: &TaskConfig,
        inputs: Value,
        produce: F,
    ) -> TaskResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(TaskConfig) -> Fut,
        Fut: Future<Output = Result<TaskResult<T>, TaskError>>,
    {
        self.meter
            .run(spec, config, |child| async move {
                let use_cache = child.use_cache;
                let key = cache_key(spec.name, &inputs, &child);

                if use_cache {
                    if let Some(hit) = self.cache.get(&key) {
                        match serde_json::from_value::<T>(hit) {
                            Ok(data) => {
                                let mut cached = TaskResult::from_cache(data);
                                cached.step(format!("Served {} from cache", spec.name));
                                return Ok(cached);
                            }
                            Err(e) => {
                                tracing::warn!(operation = spec.name, "dropping unreadable cache entry: {}", e);
                                self.cache.invalidate(&key);
                            }
                        }
                    }
                }

                let tag_config = child.clone();
                let result = produce(child).await?;

                if use_cache && result.success {
                    if let Some(data) = &result.data {
                        self.store(&key, data, &tag_config).await;
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    /// 缓存写入作为自动（免费）操作执行
    async fn store<T: Serialize>(&self, key: &str, data: &T, config: &TaskConfig) {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "cache value not serializable: {}", e);
                return;
            }
        };
        let written = self
            .meter
            .run(&ops::CACHE_WRITE, config, |_| async move {
                self.cache.set(key.to_string(), value, None);
                Ok::<_, TaskError>(TaskResult::ok(()))
            })
            .await;
        if !written.success {
            tracing::debug!(key, "cache write skipped: {}", written.error.unwrap_or_default());
        }
    }

    /// 单轮文本生成，provider 错误转为 TaskError
    pub async fn generate(&self, prompt: &str, config: &TaskConfig) -> Result<Generation, TaskError> {
        let opts = GenerateOptions::from_config(config).with_system(SYSTEM_PROMPT);
        Ok(self.llm.generate_text(prompt, &opts).await?)
    }

    pub async fn generate_chat(&self, messages: &[Message], config: &TaskConfig) -> Result<Generation, TaskError> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(Message::system(SYSTEM_PROMPT));
        full.extend_from_slice(messages);
        let opts = GenerateOptions::from_config(config);
        Ok(self.llm.generate_chat(&full, &opts).await?)
    }

    pub async fn analyze_image(
        &self,
        image_url: &str,
        prompt: &str,
        config: &TaskConfig,
    ) -> Result<Generation, TaskError> {
        let opts = GenerateOptions::from_config(config);
        Ok(self.llm.analyze_image(image_url, prompt, &opts).await?)
    }

    /// 生成并恢复为结构化形状；恢复降级不算失败
    pub async fn structured<T: Recoverable>(
        &self,
        prompt: &str,
        config: &TaskConfig,
        step: &str,
    ) -> Result<TaskResult<T>, TaskError> {
        let (recovered, usage) = self.recover_from::<T>(prompt, config).await?;
        Ok(into_result(recovered, usage, step))
    }

    /// 生成并恢复，保留恢复来源，供有本地回退的工具判断是否降级
    pub async fn recover_from<T: Recoverable>(
        &self,
        prompt: &str,
        config: &TaskConfig,
    ) -> Result<(Recovered<T>, TokenUsage), TaskError> {
        let generation = self.generate(prompt, config).await?;
        Ok((recover(&generation.text), TokenUsage::from_generation(&generation)))
    }
}

/// 把恢复结果组装成 TaskResult；降级时追加说明步骤
pub fn into_result<T: Recoverable>(recovered: Recovered<T>, usage: TokenUsage, step: &str) -> TaskResult<T> {
    let note = recovered.degraded_note(T::SHAPE);
    let mut result = TaskResult::ok(recovered.value).with_usage(usage);
    result.step(step.to_string());
    if let Some(note) = note {
        result.step(note);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize("  hi\u{0007} there \n").unwrap(), "hi there");
        assert!(sanitize(" \u{0000} ").is_err());
        let long = "x".repeat(MAX_INPUT_CHARS + 10);
        assert_eq!(sanitize(&long).unwrap().len(), MAX_INPUT_CHARS);
    }
}
