//! 结构化输出恢复的性质测试：任意文本不 panic、数值在区间内、归一化幂等

use contentops::recovery::media::{is_hex_color, ALT_TEXT_MAX_CHARS};
use contentops::recovery::{
    recover, AltText, CampaignStrategy, ColorPalette, ContentIdeas, EngagementPrediction, Hashtags,
    ImageAnalysis, MessageClassification, Outline, QualityReview, ReadabilityReport, Recoverable,
    ResponseSuggestions, ScheduleRecommendation, Sentiment, SocialPost, TextContent, ThreadSummary,
    TopicAnalysis,
};
use proptest::prelude::*;

/// 模型常见输出：标签段落、编号列表、半截 JSON、代码块
fn model_like_text() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "(Sentiment|Score|Confidence|Category|Priority|Issues|Suggestions|Topics): [ -~]{0,40}",
        "(\\d\\. [a-zA-Z #]{1,20}\n){0,6}",
        "\\{\"(sentiment|score|topics|colors|content|slots)\": [ -~]{0,30}\\}?",
        "```json\n\\{\"score\": -?[0-9]{1,4}(\\.[0-9]{1,3})?\\}\n```",
        "(#[0-9A-Fa-f]{6} ?){0,5}",
        "(Mon|Tue|Wednesday|Fri) (at )?[0-9]{1,2}(:[0-9]{2})? ?(am|pm)?",
    ]
}

fn assert_idempotent<T: Recoverable + PartialEq + std::fmt::Debug + Clone>(text: &str) -> T {
    let value = recover::<T>(text).value;
    assert_eq!(value.clone().normalized(), value, "not idempotent for {:?}", text);
    value
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn analysis_shapes_stay_in_bounds(text in model_like_text()) {
        let sentiment: Sentiment = assert_idempotent(&text);
        prop_assert!((-1.0..=1.0).contains(&sentiment.score));
        prop_assert!((0.0..=1.0).contains(&sentiment.confidence));

        let engagement: EngagementPrediction = assert_idempotent(&text);
        prop_assert!((0.0..=100.0).contains(&engagement.score));

        let readability: ReadabilityReport = assert_idempotent(&text);
        prop_assert!((0.0..=100.0).contains(&readability.score));

        let quality: QualityReview = assert_idempotent(&text);
        prop_assert!((0.0..=10.0).contains(&quality.score));

        let topics: TopicAnalysis = assert_idempotent(&text);
        prop_assert!(topics.topics.len() <= 10);
        prop_assert!(!topics.main_theme.is_empty());
    }

    #[test]
    fn content_shapes_never_panic(text in model_like_text(), platform in "(twitter|linkedin|threads|tiktok)") {
        let _: ContentIdeas = assert_idempotent(&text);
        let _: Outline = assert_idempotent(&text);
        let _: TextContent = assert_idempotent(&text);
        let _: CampaignStrategy = assert_idempotent(&text);

        let hashtags: Hashtags = assert_idempotent(&text);
        prop_assert!(hashtags.hashtags.iter().all(|t| t.starts_with('#') && !t.contains(' ')));

        let post = recover::<SocialPost>(&text).value.for_platform(&platform);
        prop_assert_eq!(post.clone().normalized(), post.clone());
        let limit = contentops::recovery::content::platform_char_limit(&platform);
        prop_assert!(post.content.chars().count() <= limit);
    }

    #[test]
    fn media_and_response_shapes_never_panic(text in model_like_text()) {
        let _: ImageAnalysis = assert_idempotent(&text);

        let alt: AltText = assert_idempotent(&text);
        prop_assert!(alt.alt_text.chars().count() <= ALT_TEXT_MAX_CHARS);

        let palette: ColorPalette = assert_idempotent(&text);
        prop_assert!(palette.colors.iter().all(|c| is_hex_color(c)));

        let replies: ResponseSuggestions = assert_idempotent(&text);
        prop_assert!(!replies.suggestions.is_empty() && replies.suggestions.len() <= 5);

        let _: MessageClassification = assert_idempotent(&text);
        let _: ThreadSummary = assert_idempotent(&text);

        let schedule: ScheduleRecommendation = assert_idempotent(&text);
        prop_assert!(schedule.slots.len() <= 14);
    }
}
