//! 回复助手类形状：回复建议、消息分类、会话摘要

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analysis::SentimentLabel;
use super::extract::{
    as_bool, as_string, as_string_list, field, labeled, labeled_block, labeled_list, list_items,
    parse_bool, strip_fences, tidy_list, tidy_text,
};
use super::Recoverable;

const FALLBACK_REPLY: &str = "Thank you for reaching out. We'll get back to you shortly.";

/// 回复建议（至少一条）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSuggestions {
    pub suggestions: Vec<String>,
}

impl Recoverable for ResponseSuggestions {
    const SHAPE: &'static str = "response_suggestions";

    fn from_json(value: &Value) -> Option<Self> {
        let suggestions = if value.is_array() {
            as_string_list(value)
        } else {
            let list = field(value, &["suggestions", "responses", "replies"])?;
            match list {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(_) => field(item, &["text", "response", "reply", "content"])
                            .and_then(as_string),
                        other => as_string(other),
                    })
                    .collect(),
                other => as_string(other).into_iter().collect(),
            }
        };
        Some(Self { suggestions })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let body = strip_fences(text);
        let items = list_items(&body);
        let suggestions = if items.is_empty() {
            // 以空行分隔的段落
            body.split("\n\n")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        } else {
            items
        };
        (!suggestions.is_empty()).then_some(Self { suggestions })
    }

    fn normalized(self) -> Self {
        let mut suggestions = tidy_list(self.suggestions, 5);
        if suggestions.is_empty() {
            suggestions.push(FALLBACK_REPLY.to_string());
        }
        Self { suggestions }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Question,
    Complaint,
    Feedback,
    Praise,
    Sales,
    Support,
    Spam,
    #[default]
    Other,
}

impl MessageCategory {
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        [
            ("spam", MessageCategory::Spam),
            ("complaint", MessageCategory::Complaint),
            ("support", MessageCategory::Support),
            ("question", MessageCategory::Question),
            ("inquiry", MessageCategory::Question),
            ("sales", MessageCategory::Sales),
            ("lead", MessageCategory::Sales),
            ("praise", MessageCategory::Praise),
            ("compliment", MessageCategory::Praise),
            ("feedback", MessageCategory::Feedback),
            ("other", MessageCategory::Other),
        ]
        .into_iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, category)| category)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("urgent") || lower.contains("critical") {
            Some(Priority::Urgent)
        } else if lower.contains("high") {
            Some(Priority::High)
        } else if lower.contains("medium") || lower.contains("normal") {
            Some(Priority::Medium)
        } else if lower.contains("low") {
            Some(Priority::Low)
        } else {
            None
        }
    }
}

/// 收件箱消息分类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageClassification {
    pub category: MessageCategory,
    pub priority: Priority,
    pub requires_response: bool,
    pub sentiment: SentimentLabel,
}

impl Default for MessageClassification {
    fn default() -> Self {
        Self {
            category: MessageCategory::Other,
            priority: Priority::Medium,
            requires_response: true,
            sentiment: SentimentLabel::Neutral,
        }
    }
}

impl Recoverable for MessageClassification {
    const SHAPE: &'static str = "message_classification";

    fn from_json(value: &Value) -> Option<Self> {
        let category = field(value, &["category", "type", "classification"])
            .and_then(as_string)
            .and_then(|s| MessageCategory::parse(&s))?;
        let defaults = Self::default();
        Some(Self {
            category,
            priority: field(value, &["priority", "urgency"])
                .and_then(as_string)
                .and_then(|s| Priority::parse(&s))
                .unwrap_or(defaults.priority),
            requires_response: field(value, &["requiresResponse", "requires_response", "needsReply"])
                .and_then(as_bool)
                .unwrap_or(defaults.requires_response),
            sentiment: field(value, &["sentiment"])
                .and_then(as_string)
                .and_then(|s| SentimentLabel::parse(&s))
                .unwrap_or(defaults.sentiment),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let category = labeled(text, &["category", "type", "classification"])
            .and_then(|s| MessageCategory::parse(&s))?;
        let defaults = Self::default();
        Some(Self {
            category,
            priority: labeled(text, &["priority", "urgency"])
                .and_then(|s| Priority::parse(&s))
                .unwrap_or(defaults.priority),
            requires_response: labeled(text, &["requires response", "needs reply", "response needed"])
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.requires_response),
            sentiment: labeled(text, &["sentiment"])
                .and_then(|s| SentimentLabel::parse(&s))
                .unwrap_or(defaults.sentiment),
        })
    }

    /// 垃圾信息从不需要回复
    fn normalized(self) -> Self {
        Self {
            requires_response: self.requires_response && self.category != MessageCategory::Spam,
            ..self
        }
    }
}

/// 会话摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
}

impl Recoverable for ThreadSummary {
    const SHAPE: &'static str = "thread_summary";

    fn from_json(value: &Value) -> Option<Self> {
        let summary = field(value, &["summary", "overview"]).and_then(as_string)?;
        Some(Self {
            summary,
            key_points: field(value, &["keyPoints", "key_points", "points"])
                .map(as_string_list)
                .unwrap_or_default(),
            action_items: field(value, &["actionItems", "action_items", "actions", "nextSteps"])
                .map(as_string_list)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let body = strip_fences(text);
        if body.is_empty() {
            return None;
        }
        let summary = labeled_block(&body, &["summary", "overview"]).unwrap_or_else(|| {
            body.split("\n\n").next().unwrap_or_default().trim().to_string()
        });
        Some(Self {
            summary,
            key_points: labeled_list(&body, &["key points", "main points"]).unwrap_or_default(),
            action_items: labeled_list(&body, &["action items", "next steps"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        Self {
            summary: tidy_text(&self.summary),
            key_points: tidy_list(self.key_points, 10),
            action_items: tidy_list(self.action_items, 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{recover, RecoverySource};

    #[test]
    fn test_suggestions_from_objects() {
        let r = recover::<ResponseSuggestions>(
            r#"{"suggestions": [{"tone": "friendly", "text": "Happy to help!"}, "Thanks!"]}"#,
        );
        assert_eq!(r.value.suggestions, vec!["Happy to help!".to_string(), "Thanks!".to_string()]);
    }

    #[test]
    fn test_suggestions_never_empty() {
        let r = recover::<ResponseSuggestions>("");
        assert_eq!(r.source, RecoverySource::Default);
        assert_eq!(r.value.suggestions.len(), 1);
    }

    #[test]
    fn test_classification_sections() {
        let text = "Category: Complaint\nPriority: HIGH\nRequires response: yes\nSentiment: negative";
        let r = recover::<MessageClassification>(text);
        assert_eq!(r.value.category, MessageCategory::Complaint);
        assert_eq!(r.value.priority, Priority::High);
        assert!(r.value.requires_response);
        assert_eq!(r.value.sentiment, SentimentLabel::Negative);
    }

    #[test]
    fn test_spam_needs_no_response() {
        let r = recover::<MessageClassification>(r#"{"category": "spam", "requiresResponse": true}"#);
        assert!(!r.value.requires_response);
    }

    #[test]
    fn test_thread_summary_sections() {
        let text = "Summary: Customer asked about refunds.\nAction items:\n- Send refund form\n- Follow up Friday";
        let r = recover::<ThreadSummary>(text);
        assert_eq!(r.value.summary, "Customer asked about refunds.");
        assert_eq!(r.value.action_items.len(), 2);
    }
}
