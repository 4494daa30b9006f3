//! 发布时间推荐；模型输出不可用时回退到各平台的静态时段表

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{as_string, field, labeled, labeled_block, tidy_text};
use super::Recoverable;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

static TIME_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn time_re() -> Option<&'static Regex> {
    TIME_RE
        .get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").ok())
        .as_ref()
}

/// 单个发布时段（24 小时制 `HH:MM`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingSlot {
    pub day: String,
    pub time: String,
}

impl PostingSlot {
    pub fn new(day: &str, time: &str) -> Self {
        Self {
            day: day.to_string(),
            time: time.to_string(),
        }
    }

    /// 规范化星期与时间；任一无法识别时返回 None
    pub fn canonical(&self) -> Option<Self> {
        Some(Self {
            day: canonical_day(&self.day)?,
            time: canonical_time(&self.time)?,
        })
    }
}

fn canonical_day(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    if lower.len() < 3 || !lower.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    WEEKDAYS
        .iter()
        .find(|day| day.to_lowercase().starts_with(&lower[..3]))
        .map(|day| day.to_string())
}

fn canonical_time(text: &str) -> Option<String> {
    let caps = time_re()?.captures(text.trim())?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if let Some(meridiem) = caps.get(3) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    (hour < 24 && minute < 60).then(|| format!("{hour:02}:{minute:02}"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecommendation {
    pub platform: String,
    pub slots: Vec<PostingSlot>,
    pub frequency: String,
    pub rationale: String,
}

impl Default for ScheduleRecommendation {
    fn default() -> Self {
        Self {
            platform: "general".to_string(),
            slots: Vec::new(),
            frequency: String::new(),
            rationale: String::new(),
        }
    }
}

impl ScheduleRecommendation {
    /// 各平台的通用最佳实践时段
    pub fn best_practice(platform: &str) -> Self {
        let platform = platform.trim().to_lowercase();
        let (slots, frequency): (&[(&str, &str)], &str) = match platform.as_str() {
            "twitter" | "x" => (
                &[("Tuesday", "09:00"), ("Wednesday", "12:00"), ("Thursday", "09:00")],
                "3-5 posts per day",
            ),
            "linkedin" => (
                &[("Tuesday", "08:00"), ("Wednesday", "10:00"), ("Thursday", "09:00")],
                "1 post per weekday",
            ),
            "instagram" => (
                &[("Monday", "11:00"), ("Wednesday", "11:00"), ("Friday", "14:00")],
                "4-7 posts per week",
            ),
            "facebook" => (
                &[("Wednesday", "11:00"), ("Thursday", "13:00"), ("Friday", "09:00")],
                "1-2 posts per day",
            ),
            _ => (
                &[("Tuesday", "10:00"), ("Thursday", "10:00")],
                "3 posts per week",
            ),
        };
        Self {
            platform: if platform.is_empty() { "general".to_string() } else { platform },
            slots: slots.iter().map(|(d, t)| PostingSlot::new(d, t)).collect(),
            frequency: frequency.to_string(),
            rationale: "General best-practice posting windows".to_string(),
        }
    }

    pub fn for_platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self.normalized()
    }
}

/// 从自由文本行中抽取「星期 + 时间」
fn slots_from_text(text: &str) -> Vec<PostingSlot> {
    let mut slots = Vec::new();
    for line in text.lines() {
        let lower = line.to_lowercase();
        let Some(day) = WEEKDAYS.iter().find(|d| lower.contains(&d.to_lowercase())) else {
            continue;
        };
        let Some(re) = time_re() else {
            continue;
        };
        for caps in re.captures_iter(line) {
            if let Some(m) = caps.get(0) {
                if let Some(time) = canonical_time(m.as_str()) {
                    slots.push(PostingSlot::new(day, &time));
                }
            }
        }
    }
    slots
}

impl Recoverable for ScheduleRecommendation {
    const SHAPE: &'static str = "schedule";

    fn from_json(value: &Value) -> Option<Self> {
        let slots = field(value, &["slots", "bestTimes", "best_times", "times"])?;
        let slots = slots
            .as_array()?
            .iter()
            .filter_map(|slot| match slot {
                Value::Object(_) => Some(PostingSlot::new(
                    &field(slot, &["day", "weekday"]).and_then(as_string)?,
                    &field(slot, &["time", "hour"]).and_then(as_string)?,
                )),
                Value::String(s) => slots_from_text(s).into_iter().next(),
                _ => None,
            })
            .collect();
        Some(Self {
            platform: field(value, &["platform"])
                .and_then(as_string)
                .unwrap_or_else(|| "general".to_string()),
            slots,
            frequency: field(value, &["frequency", "postingFrequency"])
                .and_then(as_string)
                .unwrap_or_default(),
            rationale: field(value, &["rationale", "reasoning", "explanation"])
                .and_then(as_string)
                .unwrap_or_default(),
        })
    }

    fn from_sections(text: &str) -> Option<Self> {
        let slots = slots_from_text(text);
        if slots.is_empty() {
            return None;
        }
        Some(Self {
            platform: "general".to_string(),
            slots,
            frequency: labeled(text, &["frequency", "posting frequency"]).unwrap_or_default(),
            rationale: labeled_block(text, &["rationale", "reasoning"]).unwrap_or_default(),
        })
    }

    fn normalized(self) -> Self {
        let platform = match self.platform.trim().to_lowercase() {
            p if p.is_empty() => "general".to_string(),
            p => p,
        };
        let mut slots: Vec<PostingSlot> = Vec::new();
        for slot in self.slots.iter().filter_map(PostingSlot::canonical) {
            if !slots.contains(&slot) && slots.len() < 14 {
                slots.push(slot);
            }
        }
        Self {
            platform,
            slots,
            frequency: tidy_text(&self.frequency),
            rationale: tidy_text(&self.rationale),
        }
    }
}
