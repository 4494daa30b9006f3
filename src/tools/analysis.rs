//! 内容分析工具：情感、主题、可读性、互动预测、质量评审

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{TaskConfig, TaskError, TaskResult};
use crate::metering::ops;
use crate::recovery::{
    EngagementPrediction, QualityReview, ReadabilityReport, Recovered, RecoverySource, Sentiment,
    TopicAnalysis,
};
use crate::tools::runtime::{into_result, sanitize, ToolRuntime};

/// multi_tool_analysis 支持的分析类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Sentiment,
    Topics,
    Readability,
    Engagement,
    Quality,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Sentiment,
        AnalysisKind::Topics,
        AnalysisKind::Readability,
        AnalysisKind::Engagement,
        AnalysisKind::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::Topics => "topics",
            AnalysisKind::Readability => "readability",
            AnalysisKind::Engagement => "engagement",
            AnalysisKind::Quality => "quality",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| TaskError::UnknownOperation(format!("analysis type '{s}'")))
    }
}

pub struct ContentAnalyzer {
    rt: ToolRuntime,
}

impl ContentAnalyzer {
    pub fn new(rt: ToolRuntime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.rt
    }

    pub async fn analyze_sentiment(&self, content: &str, config: &TaskConfig) -> TaskResult<Sentiment> {
        let inputs = json!({ "content": content });
        self.rt
            .invoke(&ops::ANALYZE_SENTIMENT, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Analyze the sentiment of the text below. Respond as JSON with \
                     sentiment (positive|negative|neutral|mixed), score (-1..1), confidence (0..1), emotions.\n\n{content}"
                );
                self.rt.structured::<Sentiment>(&request, &cfg, "Analyzed sentiment").await
            })
            .await
    }

    pub async fn extract_topics(&self, content: &str, config: &TaskConfig) -> TaskResult<TopicAnalysis> {
        let inputs = json!({ "content": content });
        self.rt
            .invoke(&ops::EXTRACT_TOPICS, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Extract the main topics and keywords from the text below. \
                     Respond as JSON with topics, keywords, mainTheme.\n\n{content}"
                );
                self.rt.structured::<TopicAnalysis>(&request, &cfg, "Extracted topics").await
            })
            .await
    }

    /// 模型输出无法解析时改用本地 Flesch 计算
    pub async fn analyze_readability(&self, content: &str, config: &TaskConfig) -> TaskResult<ReadabilityReport> {
        let inputs = json!({ "content": content });
        self.rt
            .invoke(&ops::ANALYZE_READABILITY, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Assess the readability of the text below. Give a Flesch reading-ease score (0-100) \
                     and improvement suggestions.\n\n{content}"
                );
                let (recovered, usage) = self.rt.recover_from::<ReadabilityReport>(&request, &cfg).await?;
                if recovered.source == RecoverySource::Default {
                    tracing::debug!("readability output unparseable, computing locally");
                    let local = Recovered {
                        value: ReadabilityReport::from_text(&content),
                        source: RecoverySource::Sections,
                    };
                    let mut result = into_result(local, usage, "Analyzed readability");
                    result.step("Computed Flesch reading ease locally");
                    return Ok(result);
                }
                Ok::<_, TaskError>(into_result(recovered, usage, "Analyzed readability"))
            })
            .await
    }

    pub async fn predict_engagement(
        &self,
        content: &str,
        platform: &str,
        config: &TaskConfig,
    ) -> TaskResult<EngagementPrediction> {
        let inputs = json!({ "content": content, "platform": platform });
        self.rt
            .invoke(&ops::PREDICT_ENGAGEMENT, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Predict the engagement this {platform} post will get. Respond as JSON with \
                     score (0-100), factors, recommendations.\n\n{content}"
                );
                self.rt
                    .structured::<EngagementPrediction>(&request, &cfg, "Predicted engagement")
                    .await
            })
            .await
    }

    pub async fn review_quality(&self, content: &str, config: &TaskConfig) -> TaskResult<QualityReview> {
        let inputs = json!({ "content": content });
        self.rt
            .invoke(&ops::REVIEW_QUALITY, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Review the quality of the text below. Give a score out of 10, then list Issues: \
                     and Suggestions:.\n\n{content}"
                );
                self.rt.structured::<QualityReview>(&request, &cfg, "Reviewed quality").await
            })
            .await
    }

    /// 按分析类型分派，结果擦除为 JSON（供编排层汇总）
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        content: &str,
        platform: &str,
        config: &TaskConfig,
    ) -> TaskResult<Value> {
        match kind {
            AnalysisKind::Sentiment => self.analyze_sentiment(content, config).await.into_json(),
            AnalysisKind::Topics => self.extract_topics(content, config).await.into_json(),
            AnalysisKind::Readability => self.analyze_readability(content, config).await.into_json(),
            AnalysisKind::Engagement => self
                .predict_engagement(content, platform, config)
                .await
                .into_json(),
            AnalysisKind::Quality => self.review_quality(content, config).await.into_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::SentimentLabel;
    use crate::tools::test_support::{runtime, Harness};

    #[test]
    fn test_analysis_kind_parse() {
        assert_eq!("Sentiment".parse::<AnalysisKind>().unwrap(), AnalysisKind::Sentiment);
        assert!("madeup".parse::<AnalysisKind>().is_err());
    }

    #[tokio::test]
    async fn test_sentiment_clamped() {
        let h = Harness::new(|m| m.on("analyze the sentiment", r#"{"sentiment": "positive", "score": 4.2}"#));
        let tool = ContentAnalyzer::new(runtime(&h));

        let result = tool.analyze_sentiment("I love this", &h.config()).await;

        let sentiment = result.data.unwrap();
        assert_eq!(sentiment.sentiment, SentimentLabel::Positive);
        assert_eq!(sentiment.score, 1.0);
        assert_eq!(sentiment.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_garbled_output_is_degraded_success() {
        let h = Harness::new(|m| m.on("analyze the sentiment", "¯\\_(ツ)_/¯"));
        let tool = ContentAnalyzer::new(runtime(&h));

        let result = tool.analyze_sentiment("meh", &h.config()).await;

        assert!(result.success);
        assert_eq!(result.data.unwrap(), Sentiment::default());
        assert!(result.process_steps.iter().any(|s| s.contains("neutral defaults")));
        // 降级结果仍是成功结果，照常计费
        assert_eq!(h.ledger.debit_count(), 1);
    }

    #[tokio::test]
    async fn test_readability_falls_back_to_local_score() {
        let h = Harness::new(|m| m.on("assess the readability", "I cannot score this."));
        let tool = ContentAnalyzer::new(runtime(&h));

        let result = tool
            .analyze_readability("The cat sat. The dog ran. It was fun.", &h.config())
            .await;

        let report = result.data.unwrap();
        assert!(report.score > 80.0);
        assert!(result.process_steps.iter().any(|s| s.contains("locally")));
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_billed() {
        let h = Harness::new(|m| m.fail_on("review the quality"));
        let tool = ContentAnalyzer::new(runtime(&h));

        let result = tool.review_quality("draft", &h.config()).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(crate::core::ErrorKind::ProviderFailure));
        assert_eq!(result.token_usage.unwrap().cost, 0);
        assert_eq!(h.ledger.debit_count(), 0);
        assert!(tool.runtime().cache().is_empty());
    }
}
