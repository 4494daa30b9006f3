//! 媒体分析类形状：图片描述、替代文本、配色

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{
    as_string, as_string_list, field, labeled, labeled_block, labeled_list, strip_fences,
    tidy_list, tidy_text, truncate_chars,
};
use super::Recoverable;

/// 替代文本的推荐上限
pub const ALT_TEXT_MAX_CHARS: usize = 125;

static HEX_COLOR_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn hex_color_re() -> Option<&'static Regex> {
    HEX_COLOR_RE
        .get_or_init(|| Regex::new(r"#[0-9A-Fa-f]{6}\b").ok())
        .as_ref()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub description: String,
    pub objects: Vec<String>,
    pub tags: Vec<String>,
    pub mood: String,
}

impl Recoverable for ImageAnalysis {
    const SHAPE: &'static str = "image_analysis";

    fn from_json(value: &Value) -> Option<Self> {
        let description = field(value, &["description", "summary", "caption"]).and_then(as_string)?;
        Some(Self {
            description,
            objects: field(value, &["objects", "elements"]).map(as_string_list).unwrap_or_default(),
            tags: field(value, &["tags", "keywords"]).map(as_string_list).unwrap_or_default(),
            mood: field(value, &["mood", "tone"]).and_then(as_string).unwrap_or_default(),
        })
    }

    /// 无标签时整段文本视为描述
    fn from_sections(text: &str) -> Option<Self> {
        let body = strip_fences(text);
        if body.is_empty() {
            return None;
        }
        let description = labeled_block(&body, &["description", "summary"]).unwrap_or_else(|| body.clone());
        Some(Self {
            description,
            objects: labeled_list(&body, &["objects", "elements"]).unwrap_or_default(),
            tags: labeled_list(&body, &["tags", "keywords"]).unwrap_or_default(),
            mood: labeled(&body, &["mood", "tone"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        Self {
            description: truncate_chars(self.description.trim(), 2000),
            objects: tidy_list(self.objects, 20),
            tags: tidy_list(self.tags, 20)
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
            mood: tidy_text(&self.mood).to_lowercase(),
        }
    }
}

/// 替代文本，最长 ALT_TEXT_MAX_CHARS 字符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltText {
    pub alt_text: String,
}

impl Default for AltText {
    fn default() -> Self {
        Self {
            alt_text: "Image".to_string(),
        }
    }
}

impl Recoverable for AltText {
    const SHAPE: &'static str = "alt_text";

    fn from_json(value: &Value) -> Option<Self> {
        let alt_text = field(value, &["altText", "alt_text", "alt", "text"]).and_then(as_string)?;
        Some(Self { alt_text })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let alt_text = labeled(text, &["alt text", "alt"]).or_else(|| {
            strip_fences(text)
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        })?;
        Some(Self { alt_text })
    }

    fn normalized(self) -> Self {
        let cleaned = tidy_text(&self.alt_text);
        let alt_text = tidy_text(&truncate_chars(&cleaned, ALT_TEXT_MAX_CHARS));
        if alt_text.is_empty() {
            Self::default()
        } else {
            Self { alt_text }
        }
    }
}

/// 配色：只保留合法的 `#RRGGBB`（统一大写）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    pub colors: Vec<String>,
    pub dominant: String,
}

pub fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl Recoverable for ColorPalette {
    const SHAPE: &'static str = "color_palette";

    fn from_json(value: &Value) -> Option<Self> {
        let colors = if value.is_array() {
            hex_list(value)
        } else {
            field(value, &["colors", "palette"]).map(hex_list)?
        };
        Some(Self {
            colors,
            dominant: field(value, &["dominant", "dominantColor", "dominant_color"])
                .and_then(as_string)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let colors: Vec<String> = hex_color_re()
            .map(|re| re.find_iter(text).map(|m| m.as_str().to_string()).collect())
            .unwrap_or_default();
        if colors.is_empty() {
            return None;
        }
        let dominant = labeled(text, &["dominant", "dominant color"])
            .and_then(|line| {
                hex_color_re().and_then(|re| re.find(&line).map(|m| m.as_str().to_string()))
            })
            .unwrap_or_default();
        Some(Self { colors, dominant })
    }

    fn normalized(self) -> Self {
        let colors: Vec<String> = tidy_list(
            self.colors
                .into_iter()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| is_hex_color(c))
                .collect(),
            12,
        );
        let dominant = self.dominant.trim().to_uppercase();
        let dominant = if colors.contains(&dominant) {
            dominant
        } else {
            colors.first().cloned().unwrap_or_default()
        };
        Self { colors, dominant }
    }
}

/// 数组元素可能是 "#AABBCC" 或 {"hex": "#AABBCC", "name": "..."}
fn hex_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => field(item, &["hex", "color", "value"]).and_then(as_string),
                other => as_string(other),
            })
            .collect(),
        other => as_string_list(other),
    }
}
