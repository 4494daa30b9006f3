//! 文本抽取工具：JSON 块定位、标签段落匹配、列表项、数值解析与区间约束

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

static LIST_ITEM_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NUMBER_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn list_item_re() -> Option<&'static Regex> {
    LIST_ITEM_RE
        .get_or_init(|| Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)]|#{1,6})\s+(.+?)\s*$").ok())
        .as_ref()
}

fn number_re() -> Option<&'static Regex> {
    NUMBER_RE
        .get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").ok())
        .as_ref()
}

/// 从模型输出中定位 JSON：整段、```json 代码块、首个平衡的 {…} / […]
pub fn json_value(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }
    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Some(value);
        }
    }
    for open in ['{', '['] {
        if let Some(span) = balanced_span(trimmed, open) {
            if let Ok(value) = serde_json::from_str::<Value>(span) {
                return Some(value);
            }
        }
    }
    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    // 跳过语言标记行
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// 从首个 open 字符开始、按括号深度找到对应的闭合位置（忽略字符串内的括号）
fn balanced_span(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 按候选键（大小写不敏感）取对象字段
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    for key in keys {
        if let Some(v) = obj.get(*key) {
            return Some(v);
        }
        if let Some((_, v)) = obj.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            return Some(v);
        }
    }
    None
}

/// 数字或数字字符串（允许 "72%"、"8/10" 形式，取第一个数）
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_number(s),
        _ => None,
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

/// 数组（字符串或含 text/name/title 字段的对象）或逗号分隔字符串
pub fn as_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => field(item, &["text", "name", "title", "value", "content"])
                    .and_then(as_string),
                other => as_string(other),
            })
            .collect(),
        Value::String(s) => split_inline_list(s),
        _ => Vec::new(),
    }
}

pub fn first_number(text: &str) -> Option<f64> {
    number_re()?
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn parse_bool(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    if lower.starts_with("yes") || lower.starts_with("true") {
        Some(true)
    } else if lower.starts_with("no") || lower.starts_with("false") {
        Some(false)
    } else {
        None
    }
}

/// 去掉 Markdown 强调与前导符号后的行
fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches(['#', '-', '*', '>', '•'])
        .replace("**", "")
        .replace("__", "")
        .trim()
        .to_string()
}

/// 行首为 `Label:` 时返回冒号后的内容（可能为空）
fn label_value(line: &str, label: &str) -> Option<String> {
    let cleaned = clean_line(line);
    let head = cleaned.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = cleaned[label.len()..].trim_start();
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('：'))?;
    Some(rest.trim().to_string())
}

fn is_header_line(line: &str) -> bool {
    let cleaned = clean_line(line);
    match cleaned.find([':', '：']) {
        Some(idx) => {
            let head = &cleaned[..idx];
            !head.is_empty()
                && head.len() <= 40
                && head
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == ' ' || c == '_' || c == '-')
                && list_item_re().map_or(true, |re| !re.is_match(line))
        }
        None => false,
    }
}

/// 单行标签值：`Sentiment: positive`
pub fn labeled(text: &str, labels: &[&str]) -> Option<String> {
    for label in labels {
        for line in text.lines() {
            if let Some(value) = label_value(line, label) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// 标签段落：标签行本身的值 + 其后直到下一个标签行 / 空行之前的内容
pub fn labeled_block(text: &str, labels: &[&str]) -> Option<String> {
    for label in labels {
        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let Some(inline) = label_value(line, label) else {
                continue;
            };
            let mut block = Vec::new();
            if !inline.is_empty() {
                block.push(inline);
            }
            for next in lines.by_ref() {
                if next.trim().is_empty() {
                    if block.is_empty() {
                        continue;
                    }
                    break;
                }
                if is_header_line(next) {
                    break;
                }
                block.push(next.trim().to_string());
            }
            if !block.is_empty() {
                return Some(block.join("\n"));
            }
        }
    }
    None
}

/// 标签段落解析为列表：多行列表项，或单行逗号分隔
pub fn labeled_list(text: &str, labels: &[&str]) -> Option<Vec<String>> {
    let block = labeled_block(text, labels)?;
    let items = list_items(&block);
    let items = if items.is_empty() {
        block
            .lines()
            .flat_map(split_inline_list)
            .collect::<Vec<_>>()
    } else {
        items
    };
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// `- a` / `* a` / `1. a` / `## a` 形式的列表项
pub fn list_items(text: &str) -> Vec<String> {
    let Some(re) = list_item_re() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("**", "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn split_inline_list(text: &str) -> Vec<String> {
    text.split([',', ';', '、', '，'])
        .map(|s| s.trim().trim_matches(['"', '\'', '.']).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 非有限值取 fallback，其余约束到 [lo, hi] 并保留三位小数
pub fn bounded(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    round3(value.clamp(lo, hi))
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// 按字符数截断
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// 去空白、去首尾引号、去空项、大小写不敏感去重并截断到 limit 项
pub fn tidy_list(items: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| tidy_text(&s))
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(limit)
        .collect()
}

/// 去首尾空白与引号
pub fn tidy_text(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .to_string()
}

/// 去掉 ``` 代码块包裹
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        if let Some(body) = fenced_block(trimmed) {
            return body.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_value_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"sentiment\": \"positive\"}\n```\nThanks";
        assert_eq!(json_value(text), Some(json!({"sentiment": "positive"})));
    }

    #[test]
    fn test_json_value_from_embedded_object() {
        let text = "Result: {\"a\": \"}\", \"b\": [1, 2]} trailing";
        assert_eq!(json_value(text), Some(json!({"a": "}", "b": [1, 2]})));
    }

    #[test]
    fn test_json_value_none_for_prose() {
        assert_eq!(json_value("just words"), None);
        assert_eq!(json_value("{broken"), None);
    }

    #[test]
    fn test_labeled_and_blocks() {
        let text = "**Sentiment:** Positive\nIssues:\n- too long\n- no CTA\n\nScore: 7/10";
        assert_eq!(labeled(text, &["sentiment"]), Some("Positive".to_string()));
        assert_eq!(
            labeled_list(text, &["issues"]),
            Some(vec!["too long".to_string(), "no CTA".to_string()])
        );
        assert_eq!(labeled(text, &["score"]).as_deref().and_then(first_number), Some(7.0));
    }

    #[test]
    fn test_inline_list() {
        let text = "Topics: coffee, brewing; mornings";
        assert_eq!(
            labeled_list(text, &["topics"]),
            Some(vec!["coffee".into(), "brewing".into(), "mornings".into()])
        );
    }

    #[test]
    fn test_bounded_handles_nan_and_range() {
        assert_eq!(bounded(f64::NAN, -1.0, 1.0, 0.0), 0.0);
        assert_eq!(bounded(3.0, -1.0, 1.0, 0.0), 1.0);
        assert_eq!(bounded(f64::NEG_INFINITY, 0.0, 100.0, 50.0), 0.0);
        assert_eq!(bounded(0.12345, -1.0, 1.0, 0.0), 0.123);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_tidy_list_dedups_case_insensitively() {
        let items = vec![" Coffee ".into(), "coffee".into(), "".into(), "\"Tea\"".into()];
        assert_eq!(tidy_list(items, 10), vec!["Coffee".to_string(), "Tea".to_string()]);
    }
}
