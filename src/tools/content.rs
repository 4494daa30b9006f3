//! 内容生成工具：通用内容、社媒帖子、创意、大纲、草稿、润色、话题标签、营销策略
//!
//! 工作流的每一步都是这里的一个方法；作为工作流子步骤调用时由计费层按组合规则免费。

use serde_json::json;

use crate::core::{TaskConfig, TaskError, TaskResult};
use crate::metering::ops;
use crate::recovery::content::platform_char_limit;
use crate::recovery::{
    CampaignStrategy, ContentIdeas, Hashtags, Outline, Recovered, SocialPost, TextContent,
};
use crate::tools::runtime::{into_result, sanitize, ToolRuntime};

pub struct ContentGenerator {
    rt: ToolRuntime,
}

impl ContentGenerator {
    pub fn new(rt: ToolRuntime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.rt
    }

    /// 按请求生成一段指定类型的内容（博客、邮件、产品描述等）
    pub async fn generate_content(
        &self,
        prompt: &str,
        content_type: &str,
        config: &TaskConfig,
    ) -> TaskResult<TextContent> {
        let inputs = json!({ "prompt": prompt, "contentType": content_type });
        self.rt
            .invoke(&ops::GENERATE_CONTENT, config, inputs, |cfg| async move {
                let prompt = sanitize(prompt)?;
                let request = format!(
                    "Produce a piece of {content_type} content for the request below.\n\
                     Start with a line `Title: ...`, then the body.\n\nRequest:\n{prompt}"
                );
                let mut result = self
                    .rt
                    .structured::<TextContent>(&request, &cfg, &format!("Generated {content_type} content"))
                    .await?;
                if let Some(data) = &result.data {
                    if data.content.is_empty() {
                        result.step("Provider returned empty content");
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    /// 生成单条社媒帖子；模型未给出话题标签时再补一次标签生成（尽力而为）
    pub async fn generate_post(&self, topic: &str, platform: &str, config: &TaskConfig) -> TaskResult<SocialPost> {
        let inputs = json!({ "topic": topic, "platform": platform });
        self.rt
            .invoke(&ops::GENERATE_POST, config, inputs, |cfg| async move {
                let topic = sanitize(topic)?;
                let platform = platform.trim().to_lowercase();
                let request = format!(
                    "Compose a {platform} post about: {topic}\n\
                     Keep it within {limit} characters. Respond as JSON with keys \
                     \"content\" and \"callToAction\".",
                    limit = platform_char_limit(&platform),
                );
                let (recovered, usage) = self.rt.recover_from::<SocialPost>(&request, &cfg).await?;
                let recovered = Recovered {
                    value: recovered.value.for_platform(&platform),
                    source: recovered.source,
                };
                let mut result = into_result(recovered, usage, &format!("Generated {platform} post"));

                let needs_tags = result.data.as_ref().is_some_and(|p| p.hashtags.is_empty() && !p.content.is_empty());
                if needs_tags {
                    let content = result.data.as_ref().map(|p| p.content.clone()).unwrap_or_default();
                    let tags = self.generate_hashtags(&content, &platform, &cfg).await;
                    let tag_usage = tags.token_usage;
                    match (tags.success, tags.data) {
                        (true, Some(tags)) => {
                            if let Some(post) = result.data.as_mut() {
                                post.hashtags = tags.hashtags;
                            }
                            if let (Some(total), Some(extra)) = (result.token_usage.as_mut(), tag_usage) {
                                total.absorb(&extra);
                            }
                            result.step("Added hashtags");
                        }
                        _ => {
                            tracing::warn!(platform = %platform, "hashtag generation failed, post kept without hashtags");
                            result.step("Hashtag generation skipped");
                        }
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    pub async fn generate_ideas(&self, topic: &str, count: usize, config: &TaskConfig) -> TaskResult<ContentIdeas> {
        let count = count.clamp(1, 20);
        let inputs = json!({ "topic": topic, "count": count });
        self.rt
            .invoke(&ops::GENERATE_IDEAS, config, inputs, |cfg| async move {
                let topic = sanitize(topic)?;
                let request = format!(
                    "Brainstorm {count} content ideas about \"{topic}\". \
                     Return a numbered list with one headline per line."
                );
                let mut result = self
                    .rt
                    .structured::<ContentIdeas>(&request, &cfg, "Generated content ideas")
                    .await?;
                if let Some(ideas) = result.data.as_mut() {
                    ideas.ideas.truncate(count);
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    pub async fn generate_outline(
        &self,
        topic: &str,
        title: &str,
        content_type: &str,
        config: &TaskConfig,
    ) -> TaskResult<Outline> {
        let inputs = json!({ "topic": topic, "title": title, "contentType": content_type });
        self.rt
            .invoke(&ops::GENERATE_OUTLINE, config, inputs, |cfg| async move {
                let topic = sanitize(topic)?;
                let request = format!(
                    "Create a detailed outline for a {content_type} titled \"{title}\" on {topic}.\n\
                     Begin with `Title: ...` and list each section as a numbered line."
                );
                let mut result = self.rt.structured::<Outline>(&request, &cfg, "Created outline").await?;
                if let Some(outline) = result.data.as_mut() {
                    if outline.title.is_empty() {
                        outline.title = title.trim().to_string();
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    pub async fn write_draft(
        &self,
        title: &str,
        outline: &Outline,
        content_type: &str,
        config: &TaskConfig,
    ) -> TaskResult<TextContent> {
        let rendered = outline.render();
        let inputs = json!({ "title": title, "outline": rendered, "contentType": content_type });
        self.rt
            .invoke(&ops::WRITE_DRAFT, config, inputs, |cfg| async move {
                let request = format!(
                    "Write the full draft of a {content_type} titled \"{title}\" following this structure:\n{rendered}"
                );
                let mut result = self.rt.structured::<TextContent>(&request, &cfg, "Wrote draft").await?;
                if let Some(draft) = result.data.as_mut() {
                    if draft.title.is_empty() {
                        draft.title = title.trim().to_string();
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }

    pub async fn refine_content(
        &self,
        draft: &str,
        instructions: &str,
        config: &TaskConfig,
    ) -> TaskResult<TextContent> {
        let inputs = json!({ "draft": draft, "instructions": instructions });
        self.rt
            .invoke(&ops::REFINE_CONTENT, config, inputs, |cfg| async move {
                let draft = sanitize(draft)?;
                let request = format!(
                    "Refine the draft below. {instructions}\nReturn only the improved text.\n\n{draft}"
                );
                self.rt.structured::<TextContent>(&request, &cfg, "Refined content").await
            })
            .await
    }

    pub async fn generate_hashtags(&self, content: &str, platform: &str, config: &TaskConfig) -> TaskResult<Hashtags> {
        let inputs = json!({ "content": content, "platform": platform });
        self.rt
            .invoke(&ops::GENERATE_HASHTAGS, config, inputs, |cfg| async move {
                let content = sanitize(content)?;
                let request = format!(
                    "Suggest relevant hashtags for this {platform} post. \
                     Respond as JSON {{\"hashtags\": [...]}}.\n\n{content}"
                );
                self.rt.structured::<Hashtags>(&request, &cfg, "Generated hashtags").await
            })
            .await
    }

    pub async fn create_campaign_strategy(
        &self,
        brief: &str,
        platforms: &[String],
        config: &TaskConfig,
    ) -> TaskResult<CampaignStrategy> {
        let inputs = json!({ "brief": brief, "platforms": platforms });
        self.rt
            .invoke(&ops::CREATE_CAMPAIGN_STRATEGY, config, inputs, |cfg| async move {
                let brief = sanitize(brief)?;
                let request = format!(
                    "Design a cross-platform campaign strategy for: {brief}\nPlatforms: {}\n\
                     Respond as JSON with objective, targetAudience, keyMessages, contentThemes, platforms.",
                    platforms.join(", ")
                );
                let mut result = self
                    .rt
                    .structured::<CampaignStrategy>(&request, &cfg, "Created campaign strategy")
                    .await?;
                if let Some(strategy) = result.data.as_mut() {
                    if strategy.platforms.is_empty() {
                        strategy.platforms = platforms.iter().map(|p| p.trim().to_lowercase()).collect();
                    }
                }
                Ok::<_, TaskError>(result)
            })
            .await
    }
}
