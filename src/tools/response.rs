//! 回复助手：回复建议、消息分类、会话摘要

use serde_json::json;

use crate::core::{TaskConfig, TaskError, TaskResult, TokenUsage};
use crate::llm::Message;
use crate::metering::ops;
use crate::recovery::{recover, MessageClassification, ResponseSuggestions, ThreadSummary};
use crate::tools::runtime::{into_result, sanitize, ToolRuntime};

pub struct ResponseAssistant {
    rt: ToolRuntime,
}

impl ResponseAssistant {
    pub fn new(rt: ToolRuntime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.rt
    }

    pub async fn suggest_responses(
        &self,
        message: &str,
        context: Option<&str>,
        tone: &str,
        config: &TaskConfig,
    ) -> TaskResult<ResponseSuggestions> {
        let inputs = json!({ "message": message, "context": context, "tone": tone });
        self.rt
            .invoke(&ops::SUGGEST_RESPONSES, config, inputs, |cfg| async move {
                let message = sanitize(message)?;
                let mut request = format!(
                    "Suggest three replies in a {tone} tone to the customer message below. \
                     Respond as JSON {{\"suggestions\": [...]}}.\n\nMessage:\n{message}"
                );
                if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
                    request.push_str(&format!("\n\nBackground:\n{}", context.trim()));
                }
                self.rt
                    .structured::<ResponseSuggestions>(&request, &cfg, "Suggested responses")
                    .await
            })
            .await
    }

    pub async fn classify_message(&self, message: &str, config: &TaskConfig) -> TaskResult<MessageClassification> {
        let inputs = json!({ "message": message });
        self.rt
            .invoke(&ops::CLASSIFY_MESSAGE, config, inputs, |cfg| async move {
                let message = sanitize(message)?;
                let request = format!(
                    "Classify this inbound message. Respond as JSON with category \
                     (question|complaint|feedback|praise|sales|support|spam|other), priority \
                     (low|medium|high|urgent), requiresResponse, sentiment.\n\n{message}"
                );
                self.rt
                    .structured::<MessageClassification>(&request, &cfg, "Classified message")
                    .await
            })
            .await
    }

    /// 会话摘要走多轮对话接口
    pub async fn summarize_thread(&self, thread: &[Message], config: &TaskConfig) -> TaskResult<ThreadSummary> {
        let inputs = json!({ "thread": thread });
        self.rt
            .invoke(&ops::SUMMARIZE_THREAD, config, inputs, |cfg| async move {
                if thread.iter().all(|m| m.content.trim().is_empty()) {
                    return Err(TaskError::InvalidInput("thread is empty".to_string()));
                }
                let mut messages = thread.to_vec();
                messages.push(Message::user(
                    "Summarize the conversation thread above. Give Summary:, Key points: and Action items:.",
                ));
                let generation = self.rt.generate_chat(&messages, &cfg).await?;
                Ok(into_result(
                    recover::<ThreadSummary>(&generation.text),
                    TokenUsage::from_generation(&generation),
                    &format!("Summarized {} messages", thread.len()),
                ))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{MessageCategory, Priority};
    use crate::tools::test_support::{runtime, Harness};

    #[tokio::test]
    async fn test_classify_spam_never_requires_response() {
        let h = Harness::new(|m| {
            m.on(
                "classify this inbound message",
                r#"{"category": "Spam", "priority": "high", "requiresResponse": true}"#,
            )
        });
        let tool = ResponseAssistant::new(runtime(&h));

        let result = tool.classify_message("WIN A PRIZE", &h.config()).await;

        let class = result.data.unwrap();
        assert_eq!(class.category, MessageCategory::Spam);
        assert_eq!(class.priority, Priority::High);
        assert!(!class.requires_response);
    }

    #[tokio::test]
    async fn test_suggestions_never_empty() {
        let h = Harness::new(|m| m.on("suggest three replies", "{}"));
        let tool = ResponseAssistant::new(runtime(&h));

        let result = tool
            .suggest_responses("Where is my order?", Some("order #42"), "friendly", &h.config())
            .await;

        assert!(result.success);
        assert!(!result.data.unwrap().suggestions.is_empty());
        assert!(h.llm.prompts()[0].contains("Background:\norder #42"));
    }

    #[tokio::test]
    async fn test_summarize_thread_uses_chat() {
        let h = Harness::new(|m| {
            m.on(
                "summarize the conversation thread",
                "Summary: Customer wants a refund.\nKey points:\n- late delivery\nAction items:\n- issue refund",
            )
        });
        let tool = ResponseAssistant::new(runtime(&h));
        let thread = vec![
            Message::user("My parcel is two weeks late"),
            Message::assistant("Sorry to hear that"),
        ];

        let result = tool.summarize_thread(&thread, &h.config()).await;

        let summary = result.data.unwrap();
        assert_eq!(summary.summary, "Customer wants a refund.");
        assert_eq!(summary.action_items, vec!["issue refund".to_string()]);
        assert!(h.llm.prompts()[0].contains("My parcel is two weeks late"));
    }
}
