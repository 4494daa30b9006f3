//! 内置工作流
//!
//! - content-creation：创意 → 大纲 → 草稿 → 润色，上一步输出进入下一步 prompt，任一步失败则整体失败；
//! - social-media-campaign：跨平台策略 → 各平台帖子 → 发布时段 → 抽样互动预测（预测失败只记录）；
//! - inbox-triage：并发分类收件箱消息，对需要回复的消息生成回复建议，逐条汇报结果。

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::core::{BatchReport, ErrorKind, TaskError, TaskResult};
use crate::workflow::types::{optional_str, required_str, string_list};
use crate::workflow::{WorkflowContext, WorkflowHandler};

pub const CONTENT_CREATION: &str = "content-creation";
pub const SOCIAL_MEDIA_CAMPAIGN: &str = "social-media-campaign";
pub const INBOX_TRIAGE: &str = "inbox-triage";

const DEFAULT_CONTENT_TYPE: &str = "blog post";
const DEFAULT_REFINEMENT: &str = "Improve clarity, flow and engagement while keeping the structure.";
const DEFAULT_PLATFORMS: [&str; 2] = ["twitter", "linkedin"];
/// 互动预测只抽样前几条帖子
const ENGAGEMENT_SAMPLE: usize = 2;

fn empty_output(step: &str) -> TaskError {
    TaskError::StepFailed {
        step: step.to_string(),
        kind: ErrorKind::ProviderFailure,
        message: "provider returned empty output".to_string(),
    }
}

pub struct ContentCreation;

#[async_trait]
impl WorkflowHandler for ContentCreation {
    async fn run(&self, ctx: &WorkflowContext, inputs: &Value) -> Result<Value, TaskError> {
        let topic = required_str(inputs, "topic")?;
        let content_type = optional_str(inputs, "contentType").unwrap_or(DEFAULT_CONTENT_TYPE);
        let instructions = optional_str(inputs, "instructions").unwrap_or(DEFAULT_REFINEMENT);
        let tools = &ctx.toolkit.content;
        let cfg = &ctx.config;

        ctx.step(format!("Starting content creation for '{topic}'"));

        let ideas = ctx.consume("ideation", tools.generate_ideas(topic, 5, cfg).await)?;
        let title = optional_str(inputs, "title")
            .map(str::to_string)
            .or_else(|| ideas.headline().map(str::to_string))
            .unwrap_or_else(|| topic.to_string());

        let outline = ctx.consume(
            "outline",
            tools.generate_outline(topic, &title, content_type, cfg).await,
        )?;

        let draft = ctx.consume("draft", tools.write_draft(&title, &outline, content_type, cfg).await)?;
        if draft.content.is_empty() {
            return Err(empty_output("draft"));
        }

        let refined = ctx.consume(
            "refinement",
            tools.refine_content(&draft.content, instructions, cfg).await,
        )?;
        if refined.content.is_empty() {
            return Err(empty_output("refinement"));
        }

        ctx.step("Content creation completed");
        Ok(json!({
            "title": title,
            "ideas": ideas.ideas,
            "outline": outline.render(),
            "draft": draft.content,
            "finalContent": refined.content,
        }))
    }

    fn description(&self) -> &str {
        "Ideation, outline, draft and refinement chained into one piece of content"
    }
}

pub struct SocialMediaCampaign;

#[async_trait]
impl WorkflowHandler for SocialMediaCampaign {
    async fn run(&self, ctx: &WorkflowContext, inputs: &Value) -> Result<Value, TaskError> {
        let brief = required_str(inputs, "brief").or_else(|_| required_str(inputs, "topic"))?;
        let mut platforms = string_list(inputs, "platforms");
        if platforms.is_empty() {
            platforms = DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect();
        }
        let platforms: Vec<String> = platforms.into_iter().map(|p| p.to_lowercase()).collect();
        let audience = optional_str(inputs, "audience");
        let kit = &ctx.toolkit;
        let cfg = &ctx.config;

        let strategy = ctx.consume(
            "strategy",
            kit.content.create_campaign_strategy(brief, &platforms, cfg).await,
        )?;
        let angle = strategy
            .key_messages
            .first()
            .map(|m| format!("{brief}. Key message: {m}"))
            .unwrap_or_else(|| brief.to_string());

        // 各平台帖子并发生成，任一失败则整体失败
        let post_results = join_all(
            platforms
                .iter()
                .map(|platform| kit.content.generate_post(&angle, platform, cfg)),
        )
        .await;
        let mut posts = BTreeMap::new();
        for (platform, result) in platforms.iter().zip(post_results) {
            let post = ctx.consume(&format!("post:{platform}"), result)?;
            posts.insert(platform.clone(), post);
        }

        let schedule_results = join_all(
            platforms
                .iter()
                .map(|platform| kit.schedule.optimize_schedule(platform, audience, cfg)),
        )
        .await;
        let mut schedule = BTreeMap::new();
        for (platform, result) in platforms.iter().zip(schedule_results) {
            schedule.insert(platform.clone(), ctx.consume(&format!("schedule:{platform}"), result)?);
        }

        // 抽样预测互动，失败只记录
        let sample: Vec<(&String, &crate::recovery::SocialPost)> = posts.iter().take(ENGAGEMENT_SAMPLE).collect();
        let predictions = join_all(
            sample
                .iter()
                .map(|(platform, post)| kit.analysis.predict_engagement(&post.content, platform, cfg)),
        )
        .await;
        let mut engagement = BTreeMap::new();
        for ((platform, _), result) in sample.iter().zip(predictions) {
            ctx.absorb(&result);
            match (result.success, result.data) {
                (true, Some(prediction)) => {
                    engagement.insert((*platform).clone(), prediction);
                }
                _ => {
                    let reason = result.error.unwrap_or_default();
                    tracing::warn!(platform = %platform, "engagement prediction failed: {}", reason);
                    ctx.step(format!("Engagement prediction failed for {platform}"));
                }
            }
        }

        ctx.step(format!("Campaign prepared for {} platforms", platforms.len()));
        Ok(json!({
            "strategy": strategy,
            "posts": posts,
            "schedule": schedule,
            "engagement": engagement,
        }))
    }

    fn description(&self) -> &str {
        "Cross-platform strategy, per-platform posts, posting schedule and engagement forecast"
    }
}

pub struct InboxTriage;

impl InboxTriage {
    /// 单条消息：分类，需要回复时再生成回复建议
    async fn triage_one(ctx: &WorkflowContext, index: usize, text: String, tone: &str) -> TaskResult<Value> {
        let kit = &ctx.toolkit;
        let classified = kit.response.classify_message(&text, &ctx.config).await;
        ctx.absorb(&classified);
        if !classified.success {
            return classified.map(|_| Value::Null);
        }
        let Some(class) = classified.data else {
            return TaskResult::failure(&empty_output("classification"));
        };

        let mut item = json!({ "index": index, "classification": class });
        if class.requires_response {
            let replies = kit.response.suggest_responses(&text, None, tone, &ctx.config).await;
            ctx.absorb(&replies);
            if !replies.success {
                return replies.map(|_| Value::Null);
            }
            if let Some(replies) = replies.data {
                item["suggestions"] = json!(replies.suggestions);
            }
        }
        TaskResult::ok(item)
    }
}

#[async_trait]
impl WorkflowHandler for InboxTriage {
    async fn run(&self, ctx: &WorkflowContext, inputs: &Value) -> Result<Value, TaskError> {
        let messages: Vec<String> = match inputs.get("messages") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => item
                        .get("text")
                        .or_else(|| item.get("content"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        if messages.is_empty() {
            return Err(TaskError::InvalidInput("missing input 'messages'".to_string()));
        }
        let tone = optional_str(inputs, "tone").unwrap_or("professional");

        let results = join_all(
            messages
                .into_iter()
                .enumerate()
                .map(|(i, text)| Self::triage_one(ctx, i, text, tone)),
        )
        .await;
        let report: BatchReport<Value> = results.into_iter().collect();

        if report.succeeded == 0 {
            return Err(TaskError::StepFailed {
                step: "triage".to_string(),
                kind: ErrorKind::ProviderFailure,
                message: format!("all {} messages failed", report.failed),
            });
        }
        if report.failed > 0 {
            tracing::warn!(failed = report.failed, succeeded = report.succeeded, "inbox triage partially failed");
        }
        ctx.step(format!(
            "Triaged {} messages ({} failed)",
            report.succeeded, report.failed
        ));
        Ok(json!({
            "succeeded": report.succeeded,
            "failed": report.failed,
            "items": report.items,
        }))
    }

    fn description(&self) -> &str {
        "Classify inbox messages and draft replies for the ones that need an answer"
    }
}
