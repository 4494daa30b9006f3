//! 结构化输出恢复
//!
//! 分层解析模型的自由文本：
//! 1. 文本中的 JSON（整段 / 代码块 / 首个平衡对象），字段类型归一并约束数值区间；
//! 2. 失败时按标签段落匹配（`Sentiment:`、`Issues:` 等）；
//! 3. 仍失败则返回该形状文档化的中性默认值并记录 warning。
//!
//! 解析从不 panic，也不返回错误；所有结果都经过 `normalized`，且 `normalized` 幂等。
//! 解析器隐藏在 [`Recoverable`] 之后，未来改用约束解码时不影响计费与缓存逻辑。

pub mod analysis;
pub mod content;
pub mod extract;
pub mod media;
pub mod response;
pub mod schedule;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use analysis::{
    EngagementLevel, EngagementPrediction, QualityReview, ReadabilityReport, Sentiment,
    SentimentLabel, TopicAnalysis,
};
pub use content::{CampaignStrategy, ContentIdeas, Hashtags, Outline, SocialPost, TextContent};
pub use media::{AltText, ColorPalette, ImageAnalysis};
pub use response::{MessageCategory, MessageClassification, Priority, ResponseSuggestions, ThreadSummary};
pub use schedule::{PostingSlot, ScheduleRecommendation};

/// 可从模型文本恢复的结构化形状
pub trait Recoverable: Sized + Default {
    /// 形状名（日志用）
    const SHAPE: &'static str;

    /// 第一层：从 JSON 取值；缺少该形状的关键字段时返回 None
    fn from_json(value: &Value) -> Option<Self>;

    /// 第二层：按标签段落匹配
    fn from_sections(text: &str) -> Option<Self>;

    /// 字段归一与区间约束；必须幂等
    fn normalized(self) -> Self;
}

/// 结果来自哪一层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySource {
    Json,
    Sections,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered<T> {
    pub value: T,
    pub source: RecoverySource,
}

impl<T> Recovered<T> {
    pub fn is_degraded(&self) -> bool {
        self.source == RecoverySource::Default
    }

    /// 降级时写入 process steps 的说明
    pub fn degraded_note(&self, shape: &str) -> Option<String> {
        self.is_degraded()
            .then(|| format!("Could not parse {shape} output; using neutral defaults"))
    }
}

/// 依次尝试 JSON → 标签段落 → 默认值
pub fn recover<T: Recoverable>(text: &str) -> Recovered<T> {
    if let Some(json) = extract::json_value(text) {
        if let Some(value) = T::from_json(&json) {
            return Recovered {
                value: value.normalized(),
                source: RecoverySource::Json,
            };
        }
    }
    if let Some(value) = T::from_sections(text) {
        return Recovered {
            value: value.normalized(),
            source: RecoverySource::Sections,
        };
    }
    tracing::warn!(
        shape = T::SHAPE,
        preview = %extract::truncate_chars(text, 120),
        "structured output recovery fell back to defaults"
    );
    Recovered {
        value: T::default().normalized(),
        source: RecoverySource::Default,
    }
}
