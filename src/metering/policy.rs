//! 计费策略表
//!
//! 每个对外操作在此显式声明：名称、类别、所需功能、计费策略。
//! Billable 操作在被其声明的组合父操作调用（metadata.parentOperation 命中）时不单独计费。

use crate::core::TaskConfig;
use crate::metering::Feature;

/// 计费策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPolicy {
    /// 直接调用时计费；作为 composite_parents 中任一父操作的子步骤时不计费
    Billable {
        composite_parents: &'static [&'static str],
    },
    /// 自动 / 免费操作：不检查余额，不扣费
    Automatic,
}

/// 一个已声明的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub category: &'static str,
    pub feature: Feature,
    pub policy: BillingPolicy,
}

impl OperationSpec {
    pub const fn billable(
        name: &'static str,
        category: &'static str,
        feature: Feature,
        composite_parents: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            category,
            feature,
            policy: BillingPolicy::Billable { composite_parents },
        }
    }

    pub const fn automatic(name: &'static str, category: &'static str, feature: Feature) -> Self {
        Self {
            name,
            category,
            feature,
            policy: BillingPolicy::Automatic,
        }
    }

    /// 同一操作按任务类型使用不同功能权限（execute_task）
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = feature;
        self
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self.policy, BillingPolicy::Automatic)
    }

    pub fn is_sub_operation_of(&self, parent: &str) -> bool {
        match self.policy {
            BillingPolicy::Billable { composite_parents } => composite_parents.contains(&parent),
            BillingPolicy::Automatic => false,
        }
    }

    /// 本次调用是否作为已登记组合父操作的子步骤
    pub fn is_composite_call(&self, config: &TaskConfig) -> bool {
        config
            .parent_operation()
            .is_some_and(|parent| self.is_sub_operation_of(parent))
    }

    /// 账本扣费原因
    pub fn reason(&self) -> String {
        format!("{}:{}", self.category, self.name)
    }
}

const GENERATION_PARENTS: &[&str] = &["execute_task", "generate_with_rag", "execute_workflow"];
const ANALYSIS_PARENTS: &[&str] = &["execute_task", "multi_tool_analysis", "execute_workflow"];
const WORKFLOW_PARENTS: &[&str] = &["execute_workflow"];
const HASHTAG_PARENTS: &[&str] = &["generate_post", "generate_content", "execute_workflow"];

/// 所有已声明操作
pub mod ops {
    use super::*;

    // 编排层
    pub const EXECUTE_TASK: OperationSpec =
        OperationSpec::billable("execute_task", "orchestrator", Feature::ContentGeneration, &[]);
    pub const GENERATE_WITH_RAG: OperationSpec = OperationSpec::billable(
        "generate_with_rag",
        "orchestrator",
        Feature::RagGeneration,
        &["execute_task"],
    );
    pub const MULTI_TOOL_ANALYSIS: OperationSpec = OperationSpec::billable(
        "multi_tool_analysis",
        "orchestrator",
        Feature::MultiToolAnalysis,
        &["execute_task"],
    );
    pub const EXECUTE_WORKFLOW: OperationSpec = OperationSpec::billable(
        "execute_workflow",
        "orchestrator",
        Feature::Workflow,
        &["execute_task"],
    );

    // 内容生成
    pub const GENERATE_CONTENT: OperationSpec = OperationSpec::billable(
        "generate_content",
        "content",
        Feature::ContentGeneration,
        GENERATION_PARENTS,
    );
    pub const GENERATE_POST: OperationSpec = OperationSpec::billable(
        "generate_post",
        "content",
        Feature::ContentGeneration,
        GENERATION_PARENTS,
    );
    pub const GENERATE_IDEAS: OperationSpec = OperationSpec::billable(
        "generate_ideas",
        "content",
        Feature::ContentGeneration,
        WORKFLOW_PARENTS,
    );
    pub const GENERATE_OUTLINE: OperationSpec = OperationSpec::billable(
        "generate_outline",
        "content",
        Feature::ContentGeneration,
        WORKFLOW_PARENTS,
    );
    pub const WRITE_DRAFT: OperationSpec = OperationSpec::billable(
        "write_draft",
        "content",
        Feature::ContentGeneration,
        WORKFLOW_PARENTS,
    );
    pub const REFINE_CONTENT: OperationSpec = OperationSpec::billable(
        "refine_content",
        "content",
        Feature::ContentGeneration,
        WORKFLOW_PARENTS,
    );
    pub const GENERATE_HASHTAGS: OperationSpec = OperationSpec::billable(
        "generate_hashtags",
        "content",
        Feature::ContentGeneration,
        HASHTAG_PARENTS,
    );
    pub const CREATE_CAMPAIGN_STRATEGY: OperationSpec = OperationSpec::billable(
        "create_campaign_strategy",
        "content",
        Feature::ContentGeneration,
        WORKFLOW_PARENTS,
    );

    // 内容分析
    pub const ANALYZE_SENTIMENT: OperationSpec = OperationSpec::billable(
        "analyze_sentiment",
        "analysis",
        Feature::ContentAnalysis,
        ANALYSIS_PARENTS,
    );
    pub const EXTRACT_TOPICS: OperationSpec = OperationSpec::billable(
        "extract_topics",
        "analysis",
        Feature::ContentAnalysis,
        ANALYSIS_PARENTS,
    );
    pub const ANALYZE_READABILITY: OperationSpec = OperationSpec::billable(
        "analyze_readability",
        "analysis",
        Feature::ContentAnalysis,
        ANALYSIS_PARENTS,
    );
    pub const PREDICT_ENGAGEMENT: OperationSpec = OperationSpec::billable(
        "predict_engagement",
        "analysis",
        Feature::ContentAnalysis,
        ANALYSIS_PARENTS,
    );
    pub const REVIEW_QUALITY: OperationSpec = OperationSpec::billable(
        "review_quality",
        "analysis",
        Feature::ContentAnalysis,
        ANALYSIS_PARENTS,
    );

    // 媒体分析
    pub const ANALYZE_IMAGE: OperationSpec = OperationSpec::billable(
        "analyze_image",
        "media",
        Feature::MediaAnalysis,
        WORKFLOW_PARENTS,
    );
    pub const GENERATE_ALT_TEXT: OperationSpec = OperationSpec::billable(
        "generate_alt_text",
        "media",
        Feature::MediaAnalysis,
        WORKFLOW_PARENTS,
    );
    pub const EXTRACT_COLOR_PALETTE: OperationSpec = OperationSpec::billable(
        "extract_color_palette",
        "media",
        Feature::MediaAnalysis,
        WORKFLOW_PARENTS,
    );

    // 回复助手
    pub const SUGGEST_RESPONSES: OperationSpec = OperationSpec::billable(
        "suggest_responses",
        "response",
        Feature::ResponseAssistance,
        WORKFLOW_PARENTS,
    );
    pub const CLASSIFY_MESSAGE: OperationSpec = OperationSpec::billable(
        "classify_message",
        "response",
        Feature::ResponseAssistance,
        WORKFLOW_PARENTS,
    );
    pub const SUMMARIZE_THREAD: OperationSpec = OperationSpec::billable(
        "summarize_thread",
        "response",
        Feature::ResponseAssistance,
        WORKFLOW_PARENTS,
    );

    // 排期
    pub const OPTIMIZE_SCHEDULE: OperationSpec = OperationSpec::billable(
        "optimize_schedule",
        "schedule",
        Feature::ScheduleOptimization,
        &["execute_task", "execute_workflow"],
    );

    // 自动 / 免费
    pub const CACHE_WRITE: OperationSpec =
        OperationSpec::automatic("cache_write", "system", Feature::ContentGeneration);
    pub const SANITIZE_INPUT: OperationSpec =
        OperationSpec::automatic("sanitize_input", "system", Feature::ContentGeneration);
    pub const LOG_ACTIVITY: OperationSpec =
        OperationSpec::automatic("log_activity", "system", Feature::ContentGeneration);
}

/// 静态可见的完整操作表
pub const OPERATION_TABLE: &[OperationSpec] = &[
    ops::EXECUTE_TASK,
    ops::GENERATE_WITH_RAG,
    ops::MULTI_TOOL_ANALYSIS,
    ops::EXECUTE_WORKFLOW,
    ops::GENERATE_CONTENT,
    ops::GENERATE_POST,
    ops::GENERATE_IDEAS,
    ops::GENERATE_OUTLINE,
    ops::WRITE_DRAFT,
    ops::REFINE_CONTENT,
    ops::GENERATE_HASHTAGS,
    ops::CREATE_CAMPAIGN_STRATEGY,
    ops::ANALYZE_SENTIMENT,
    ops::EXTRACT_TOPICS,
    ops::ANALYZE_READABILITY,
    ops::PREDICT_ENGAGEMENT,
    ops::REVIEW_QUALITY,
    ops::ANALYZE_IMAGE,
    ops::GENERATE_ALT_TEXT,
    ops::EXTRACT_COLOR_PALETTE,
    ops::SUGGEST_RESPONSES,
    ops::CLASSIFY_MESSAGE,
    ops::SUMMARIZE_THREAD,
    ops::OPTIMIZE_SCHEDULE,
    ops::CACHE_WRITE,
    ops::SANITIZE_INPUT,
    ops::LOG_ACTIVITY,
];

pub fn lookup(name: &str) -> Option<&'static OperationSpec> {
    OPERATION_TABLE.iter().find(|spec| spec.name == name)
}
