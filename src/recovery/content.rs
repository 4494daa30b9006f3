//! 内容生成类形状：创意、大纲、正文、社媒帖子、话题标签、营销策略

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{
    as_string, as_string_list, field, labeled, labeled_block, labeled_list, list_items,
    strip_fences, tidy_list, tidy_text, truncate_chars,
};
use super::Recoverable;

static HASHTAG_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn hashtag_re() -> Option<&'static Regex> {
    HASHTAG_RE
        .get_or_init(|| Regex::new(r"#[\p{L}\p{N}_]+").ok())
        .as_ref()
}

/// 各平台正文字符上限
pub fn platform_char_limit(platform: &str) -> usize {
    match platform.trim().to_lowercase().as_str() {
        "twitter" | "x" => 280,
        "linkedin" => 3000,
        "instagram" => 2200,
        "facebook" => 63206,
        "threads" => 500,
        _ => 2000,
    }
}

/// 创意列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentIdeas {
    pub ideas: Vec<String>,
}

impl ContentIdeas {
    /// 首个创意作为标题候选
    pub fn headline(&self) -> Option<&str> {
        self.ideas.first().map(String::as_str)
    }
}

impl Recoverable for ContentIdeas {
    const SHAPE: &'static str = "ideas";

    fn from_json(value: &Value) -> Option<Self> {
        let ideas = if value.is_array() {
            as_string_list(value)
        } else {
            field(value, &["ideas", "titles", "suggestions"]).map(as_string_list)?
        };
        Some(Self { ideas })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let items = list_items(text);
        let ideas = if items.is_empty() {
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.ends_with(':'))
                .map(str::to_string)
                .collect()
        } else {
            items
        };
        (!ideas.is_empty()).then_some(Self { ideas })
    }

    fn normalized(self) -> Self {
        Self {
            ideas: tidy_list(self.ideas, 10),
        }
    }
}

/// 大纲
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<String>,
}

impl Outline {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str(&self.title);
            out.push('\n');
        }
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, section));
        }
        out.trim_end().to_string()
    }
}

impl Recoverable for Outline {
    const SHAPE: &'static str = "outline";

    fn from_json(value: &Value) -> Option<Self> {
        if value.is_array() {
            return Some(Self {
                title: String::new(),
                sections: as_string_list(value),
            });
        }
        let sections = field(value, &["sections", "outline", "headings"])?;
        Some(Self {
            title: field(value, &["title"]).and_then(as_string).unwrap_or_default(),
            sections: as_string_list(sections),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let sections = list_items(text);
        if sections.is_empty() {
            return None;
        }
        Some(Self {
            title: labeled(text, &["title"]).unwrap_or_default(),
            sections,
        })
    }

    fn normalized(self) -> Self {
        Self {
            title: tidy_text(&self.title),
            sections: tidy_list(self.sections, 30),
        }
    }
}

/// 自由文本产物（正文、草稿、润色稿）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub title: String,
    pub content: String,
}

impl Recoverable for TextContent {
    const SHAPE: &'static str = "text";

    fn from_json(value: &Value) -> Option<Self> {
        let content = field(value, &["content", "text", "draft", "body", "finalContent"])
            .and_then(as_string)?;
        Some(Self {
            title: field(value, &["title", "headline"]).and_then(as_string).unwrap_or_default(),
            content,
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let body = strip_fences(text);
        if body.is_empty() {
            return None;
        }
        let title = labeled(&body, &["title", "headline"]);
        let content = match &title {
            Some(_) => body
                .lines()
                .skip_while(|l| l.trim().is_empty())
                .skip(1)
                .collect::<Vec<_>>()
                .join("\n"),
            None => body.clone(),
        };
        let content = if content.trim().is_empty() { body } else { content };
        Some(Self {
            title: title.unwrap_or_default(),
            content,
        })
    }

    fn normalized(self) -> Self {
        Self {
            title: tidy_text(&self.title),
            content: self.content.trim().to_string(),
        }
    }
}

/// 社媒帖子；正文按平台上限截断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub platform: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub call_to_action: String,
}

impl Default for SocialPost {
    fn default() -> Self {
        Self {
            platform: "general".to_string(),
            content: String::new(),
            hashtags: Vec::new(),
            call_to_action: String::new(),
        }
    }
}

impl SocialPost {
    pub fn for_platform(mut self, platform: &str) -> Self {
        self.platform = platform.trim().to_lowercase();
        self.normalized()
    }
}

impl Recoverable for SocialPost {
    const SHAPE: &'static str = "social_post";

    fn from_json(value: &Value) -> Option<Self> {
        let content = field(value, &["content", "post", "text", "caption"]).and_then(as_string)?;
        Some(Self {
            platform: field(value, &["platform"])
                .and_then(as_string)
                .unwrap_or_else(|| "general".to_string()),
            content,
            hashtags: field(value, &["hashtags", "tags"]).map(as_string_list).unwrap_or_default(),
            call_to_action: field(value, &["callToAction", "call_to_action", "cta"])
                .and_then(as_string)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let body = strip_fences(text);
        if body.is_empty() {
            return None;
        }
        let content = labeled_block(&body, &["post", "content", "caption"]).unwrap_or_else(|| {
            body.lines()
                .filter(|l| {
                    let lower = l.trim().to_lowercase();
                    !lower.starts_with("hashtags:") && !lower.starts_with("call to action:")
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
        Some(Self {
            platform: "general".to_string(),
            content,
            hashtags: labeled_list(&body, &["hashtags"]).unwrap_or_default(),
            call_to_action: labeled(&body, &["call to action", "cta"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        let platform = match self.platform.trim().to_lowercase() {
            p if p.is_empty() => "general".to_string(),
            p => p,
        };
        let content = truncate_chars(self.content.trim(), platform_char_limit(&platform));
        let mut hashtags = canonical_hashtags(self.hashtags);
        if hashtags.is_empty() {
            hashtags = canonical_hashtags(harvest_hashtags(&content));
        }
        Self {
            platform,
            content,
            hashtags,
            call_to_action: tidy_text(&self.call_to_action),
        }
    }
}

fn harvest_hashtags(text: &str) -> Vec<String> {
    hashtag_re()
        .map(|re| re.find_iter(text).map(|m| m.as_str().to_string()).collect())
        .unwrap_or_default()
}

/// `#tag` 形式、无空白、大小写不敏感去重、最多 30 个
fn canonical_hashtags(tags: Vec<String>) -> Vec<String> {
    let tagged = tags
        .into_iter()
        .map(|t| {
            let word: String = t
                .trim()
                .trim_start_matches('#')
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if word.is_empty() {
                String::new()
            } else {
                format!("#{word}")
            }
        })
        .collect();
    tidy_list(tagged, 30)
}

/// 话题标签
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hashtags {
    pub hashtags: Vec<String>,
}

impl Recoverable for Hashtags {
    const SHAPE: &'static str = "hashtags";

    fn from_json(value: &Value) -> Option<Self> {
        let hashtags = if value.is_array() {
            as_string_list(value)
        } else {
            field(value, &["hashtags", "tags"]).map(as_string_list)?
        };
        Some(Self { hashtags })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let found = harvest_hashtags(text);
        let hashtags = if found.is_empty() {
            let items = list_items(text);
            if items.is_empty() {
                text.lines().flat_map(super::extract::split_inline_list).collect()
            } else {
                items
            }
        } else {
            found
        };
        (!hashtags.is_empty()).then_some(Self { hashtags })
    }

    fn normalized(self) -> Self {
        Self {
            hashtags: canonical_hashtags(self.hashtags),
        }
    }
}

/// 跨平台营销策略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStrategy {
    pub objective: String,
    pub target_audience: String,
    pub key_messages: Vec<String>,
    pub content_themes: Vec<String>,
    pub platforms: Vec<String>,
}

impl Recoverable for CampaignStrategy {
    const SHAPE: &'static str = "campaign_strategy";

    fn from_json(value: &Value) -> Option<Self> {
        let objective = field(value, &["objective", "goal", "strategy"]).and_then(as_string);
        let messages = field(value, &["keyMessages", "key_messages", "messages"]);
        if objective.is_none() && messages.is_none() {
            return None;
        }
        Some(Self {
            objective: objective.unwrap_or_default(),
            target_audience: field(value, &["targetAudience", "target_audience", "audience"])
                .and_then(as_string)
                .unwrap_or_default(),
            key_messages: messages.map(as_string_list).unwrap_or_default(),
            content_themes: field(value, &["contentThemes", "content_themes", "themes", "pillars"])
                .map(as_string_list)
                .unwrap_or_default(),
            platforms: field(value, &["platforms"]).map(as_string_list).unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let objective = labeled(text, &["objective", "goal"]);
        let key_messages = labeled_list(text, &["key messages", "messages"]);
        if objective.is_none() && key_messages.is_none() {
            return None;
        }
        Some(Self {
            objective: objective.unwrap_or_default(),
            target_audience: labeled(text, &["target audience", "audience"]).unwrap_or_default(),
            key_messages: key_messages.unwrap_or_default(),
            content_themes: labeled_list(text, &["content themes", "themes", "content pillars"])
                .unwrap_or_default(),
            platforms: labeled_list(text, &["platforms"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        Self {
            objective: tidy_text(&self.objective),
            target_audience: tidy_text(&self.target_audience),
            key_messages: tidy_list(self.key_messages, 10),
            content_themes: tidy_list(self.content_themes, 10),
            platforms: tidy_list(self.platforms, 10)
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }
}
