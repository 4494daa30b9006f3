//! 内容分析类形状：情感、主题、互动预测、可读性、质量评审

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{
    as_f64, as_string, as_string_list, bounded, field, first_number, labeled, labeled_list,
    list_items, tidy_list, tidy_text,
};
use super::Recoverable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    #[default]
    Neutral,
    Mixed,
}

impl SentimentLabel {
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("mixed") {
            Some(SentimentLabel::Mixed)
        } else if lower.contains("negative") {
            Some(SentimentLabel::Negative)
        } else if lower.contains("positive") {
            Some(SentimentLabel::Positive)
        } else if lower.contains("neutral") {
            Some(SentimentLabel::Neutral)
        } else {
            None
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score > 0.2 {
            SentimentLabel::Positive
        } else if score < -0.2 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// 情感分析：score ∈ [-1, 1]，confidence ∈ [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentiment {
    pub sentiment: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    pub emotions: Vec<String>,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.5,
            emotions: Vec::new(),
        }
    }
}

impl Sentiment {
    fn assemble(label: Option<SentimentLabel>, score: Option<f64>, confidence: Option<f64>, emotions: Vec<String>) -> Self {
        let defaults = Sentiment::default();
        let score = score.unwrap_or(defaults.score);
        Self {
            sentiment: label.unwrap_or_else(|| SentimentLabel::from_score(score)),
            score,
            confidence: confidence.unwrap_or(defaults.confidence),
            emotions,
        }
    }
}

impl Recoverable for Sentiment {
    const SHAPE: &'static str = "sentiment";

    fn from_json(value: &Value) -> Option<Self> {
        let label = field(value, &["sentiment", "label", "overall"]);
        let score = field(value, &["score", "sentimentScore", "sentiment_score"]);
        if label.is_none() && score.is_none() {
            return None;
        }
        Some(Self::assemble(
            label.and_then(as_string).and_then(|s| SentimentLabel::parse(&s)),
            score.and_then(as_f64),
            field(value, &["confidence"]).and_then(as_f64),
            field(value, &["emotions"]).map(as_string_list).unwrap_or_default(),
        ))
    }

    fn from_sections(text: &str) -> Option<Self> {
        let label = labeled(text, &["sentiment", "overall sentiment"]);
        let score = labeled(text, &["score", "sentiment score"]);
        if label.is_none() && score.is_none() {
            return None;
        }
        Some(Self::assemble(
            label.and_then(|s| SentimentLabel::parse(&s)),
            score.as_deref().and_then(first_number),
            labeled(text, &["confidence"]).as_deref().and_then(first_number),
            labeled_list(text, &["emotions"]).unwrap_or_default(),
        ))
    }

    fn normalized(self) -> Self {
        Self {
            sentiment: self.sentiment,
            score: bounded(self.score, -1.0, 1.0, 0.0),
            confidence: bounded(self.confidence, 0.0, 1.0, 0.5),
            emotions: tidy_list(self.emotions, 8)
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }
}

/// 主题抽取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicAnalysis {
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub main_theme: String,
}

impl Default for TopicAnalysis {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            keywords: Vec::new(),
            main_theme: "general".to_string(),
        }
    }
}

impl Recoverable for TopicAnalysis {
    const SHAPE: &'static str = "topics";

    fn from_json(value: &Value) -> Option<Self> {
        if value.is_array() {
            return Some(Self {
                topics: as_string_list(value),
                keywords: Vec::new(),
                main_theme: String::new(),
            });
        }
        let topics = field(value, &["topics", "mainTopics", "main_topics"])?;
        Some(Self {
            topics: as_string_list(topics),
            keywords: field(value, &["keywords"]).map(as_string_list).unwrap_or_default(),
            main_theme: field(value, &["mainTheme", "main_theme", "theme"])
                .and_then(as_string)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let topics = labeled_list(text, &["topics", "main topics"])
            .or_else(|| Some(list_items(text)).filter(|items| !items.is_empty()))?;
        Some(Self {
            topics,
            keywords: labeled_list(text, &["keywords"]).unwrap_or_default(),
            main_theme: labeled(text, &["main theme", "theme"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        let topics = tidy_list(self.topics, 10);
        let keywords = tidy_list(self.keywords, 20);
        let mut main_theme = tidy_text(&self.main_theme);
        if main_theme.is_empty() {
            main_theme = topics.first().cloned().unwrap_or_else(|| "general".to_string());
        }
        Self {
            topics,
            keywords,
            main_theme,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl EngagementLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            EngagementLevel::High
        } else if score >= 40.0 {
            EngagementLevel::Medium
        } else {
            EngagementLevel::Low
        }
    }
}

/// 互动预测：score ∈ [0, 100]，level 由 score 推出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementPrediction {
    pub score: f64,
    pub level: EngagementLevel,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Default for EngagementPrediction {
    fn default() -> Self {
        Self {
            score: 50.0,
            level: EngagementLevel::Medium,
            factors: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

impl Recoverable for EngagementPrediction {
    const SHAPE: &'static str = "engagement";

    fn from_json(value: &Value) -> Option<Self> {
        let score = field(value, &["score", "engagementScore", "engagement_score"])
            .and_then(as_f64)?;
        Some(Self {
            score,
            factors: field(value, &["factors"]).map(as_string_list).unwrap_or_default(),
            recommendations: field(value, &["recommendations", "suggestions"])
                .map(as_string_list)
                .unwrap_or_default(),
            ..Self::default()
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let score = labeled(text, &["engagement score", "score", "predicted engagement"])
            .as_deref()
            .and_then(first_number)?;
        Some(Self {
            score,
            factors: labeled_list(text, &["factors", "key factors"]).unwrap_or_default(),
            recommendations: labeled_list(text, &["recommendations", "suggestions"])
                .unwrap_or_default(),
            ..Self::default()
        })
    }

    fn normalized(self) -> Self {
        let score = bounded(self.score, 0.0, 100.0, 50.0);
        Self {
            score,
            level: EngagementLevel::from_score(score),
            factors: tidy_list(self.factors, 10),
            recommendations: tidy_list(self.recommendations, 10),
        }
    }
}

/// 可读性：Flesch reading ease，score ∈ [0, 100]，等级由 score 推出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadabilityReport {
    pub score: f64,
    pub grade_level: String,
    pub suggestions: Vec<String>,
}

impl Default for ReadabilityReport {
    fn default() -> Self {
        Self {
            score: 50.0,
            grade_level: String::new(),
            suggestions: Vec::new(),
        }
    }
}

impl ReadabilityReport {
    /// 本地计算的 Flesch reading ease，模型输出不可用时使用
    pub fn from_text(content: &str) -> Self {
        let sentences = content
            .split(['.', '!', '?'])
            .filter(|s| s.split_whitespace().next().is_some())
            .count()
            .max(1);
        let words: Vec<&str> = content.split_whitespace().collect();
        if words.is_empty() {
            return Self::default().normalized();
        }
        let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
        let words_per_sentence = words.len() as f64 / sentences as f64;
        let syllables_per_word = syllables as f64 / words.len() as f64;
        let score = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;

        let mut suggestions = Vec::new();
        if words_per_sentence > 20.0 {
            suggestions.push("Shorten long sentences".to_string());
        }
        if syllables_per_word > 1.7 {
            suggestions.push("Prefer shorter, simpler words".to_string());
        }
        Self {
            score,
            grade_level: String::new(),
            suggestions,
        }
        .normalized()
    }

    fn grade_for(score: f64) -> &'static str {
        match score {
            s if s >= 90.0 => "very easy",
            s if s >= 80.0 => "easy",
            s if s >= 70.0 => "fairly easy",
            s if s >= 60.0 => "standard",
            s if s >= 50.0 => "fairly difficult",
            s if s >= 30.0 => "difficult",
            _ => "very difficult",
        }
    }
}

fn count_syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if letters.is_empty() {
        return 0;
    }
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut prev_vowel = false;
    for &c in &letters {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    if letters.len() > 2 && letters.last() == Some(&'e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

impl Recoverable for ReadabilityReport {
    const SHAPE: &'static str = "readability";

    fn from_json(value: &Value) -> Option<Self> {
        let score = field(value, &["score", "readabilityScore", "readability_score", "fleschScore"])
            .and_then(as_f64)?;
        Some(Self {
            score,
            grade_level: String::new(),
            suggestions: field(value, &["suggestions", "improvements"])
                .map(as_string_list)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let score = labeled(text, &["readability score", "score", "flesch score"])
            .as_deref()
            .and_then(first_number)?;
        Some(Self {
            score,
            grade_level: String::new(),
            suggestions: labeled_list(text, &["suggestions", "improvements"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        let score = bounded(self.score, 0.0, 100.0, 50.0);
        Self {
            score,
            grade_level: Self::grade_for(score).to_string(),
            suggestions: tidy_list(self.suggestions, 10),
        }
    }
}

/// 质量评审：score ∈ [0, 10]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReview {
    pub score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Default for QualityReview {
    fn default() -> Self {
        Self {
            score: 5.0,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

impl Recoverable for QualityReview {
    const SHAPE: &'static str = "quality";

    fn from_json(value: &Value) -> Option<Self> {
        let score = field(value, &["score", "qualityScore", "quality_score", "rating"]);
        let issues = field(value, &["issues", "problems"]);
        if score.is_none() && issues.is_none() {
            return None;
        }
        Some(Self {
            score: score.and_then(as_f64).unwrap_or(5.0),
            issues: issues.map(as_string_list).unwrap_or_default(),
            suggestions: field(value, &["suggestions", "improvements"])
                .map(as_string_list)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let score = labeled(text, &["score", "quality score", "rating"])
            .as_deref()
            .and_then(first_number);
        let issues = labeled_list(text, &["issues", "problems"]);
        if score.is_none() && issues.is_none() {
            return None;
        }
        Some(Self {
            score: score.unwrap_or(5.0),
            issues: issues.unwrap_or_default(),
            suggestions: labeled_list(text, &["suggestions", "improvements"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        Self {
            score: bounded(self.score, 0.0, 10.0, 5.0),
            issues: tidy_list(self.issues, 20),
            suggestions: tidy_list(self.suggestions, 20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{recover, RecoverySource};

    #[test]
    fn test_sentiment_score_clamped_and_label_derived() {
        let r = recover::<Sentiment>(r#"{"score": 4.2, "confidence": "90%"}"#);
        assert_eq!(r.value.score, 1.0);
        assert_eq!(r.value.confidence, 1.0);
        assert_eq!(r.value.sentiment, SentimentLabel::Positive);
    }

    #[test]
    fn test_sentiment_emotions_from_sections() {
        let text = "Sentiment: Mixed\nScore: 0.1\nConfidence: 0.7\nEmotions: Joy, surprise";
        let r = recover::<Sentiment>(text);
        assert_eq!(r.source, RecoverySource::Sections);
        assert_eq!(r.value.sentiment, SentimentLabel::Mixed);
        assert_eq!(r.value.emotions, vec!["joy".to_string(), "surprise".to_string()]);
    }

    #[test]
    fn test_topics_from_top_level_array() {
        let r = recover::<TopicAnalysis>(r#"["Coffee", "Brewing", "coffee"]"#);
        assert_eq!(r.value.topics, vec!["Coffee".to_string(), "Brewing".to_string()]);
        assert_eq!(r.value.main_theme, "Coffee");
    }

    #[test]
    fn test_topics_from_bullets() {
        let r = recover::<TopicAnalysis>("Here are the topics\n- latte art\n- espresso");
        assert_eq!(r.value.topics.len(), 2);
    }

    #[test]
    fn test_engagement_level_follows_score() {
        let r = recover::<EngagementPrediction>("Engagement score: 82/100\nFactors:\n- strong hook");
        assert_eq!(r.value.score, 82.0);
        assert_eq!(r.value.level, EngagementLevel::High);
        assert_eq!(r.value.factors, vec!["strong hook".to_string()]);

        let clamped = recover::<EngagementPrediction>(r#"{"score": -12}"#);
        assert_eq!(clamped.value.score, 0.0);
        assert_eq!(clamped.value.level, EngagementLevel::Low);
    }

    #[test]
    fn test_flesch_fallback() {
        let easy = ReadabilityReport::from_text("The cat sat. The dog ran. We had fun.");
        let hard = ReadabilityReport::from_text(
            "Notwithstanding considerable organizational complexity, interdepartmental \
             communication methodologies necessitate comprehensive institutional reconsideration.",
        );
        assert!(easy.score > hard.score);
        assert!((0.0..=100.0).contains(&hard.score));
        assert!(!hard.suggestions.is_empty());
    }

    #[test]
    fn test_quality_review_sections() {
        let text = "Quality score: 8\nIssues:\n- passive voice\nSuggestions:\n- add a CTA";
        let r = recover::<QualityReview>(text);
        assert_eq!(r.value.score, 8.0);
        assert_eq!(r.value.issues, vec!["passive voice".to_string()]);
        assert_eq!(r.value.suggestions, vec!["add a CTA".to_string()]);
    }
}
