//! 媒体分析工具：图片描述、替代文本、配色提取（结果较稳定，缓存 TTL 更长）

use serde_json::json;

use crate::core::{TaskConfig, TaskError, TaskResult, TokenUsage};
use crate::metering::ops;
use crate::recovery::{recover, AltText, ColorPalette, ImageAnalysis, Recoverable};
use crate::tools::runtime::{into_result, ToolRuntime};

/// 只接受 http(s) 与 data URL
fn validate_image_url(url: &str) -> Result<String, TaskError> {
    let url = url.trim();
    let lower = url.to_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("data:image/") {
        Ok(url.to_string())
    } else {
        Err(TaskError::InvalidInput(format!("unsupported image url '{url}'")))
    }
}

pub struct MediaAnalyzer {
    rt: ToolRuntime,
}

impl MediaAnalyzer {
    pub fn new(rt: ToolRuntime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.rt
    }

    async fn vision<T: Recoverable>(
        &self,
        image_url: &str,
        prompt: &str,
        config: &TaskConfig,
        step: &str,
    ) -> Result<TaskResult<T>, TaskError> {
        let url = validate_image_url(image_url)?;
        let generation = self.rt.analyze_image(&url, prompt, config).await?;
        Ok(into_result(
            recover::<T>(&generation.text),
            TokenUsage::from_generation(&generation),
            step,
        ))
    }

    pub async fn analyze_image(
        &self,
        image_url: &str,
        prompt: Option<&str>,
        config: &TaskConfig,
    ) -> TaskResult<ImageAnalysis> {
        let focus = prompt.unwrap_or("general content").to_string();
        let inputs = json!({ "imageUrl": image_url, "prompt": focus });
        self.rt
            .invoke(&ops::ANALYZE_IMAGE, config, inputs, |cfg| async move {
                let request = format!(
                    "Describe this image with a focus on {focus}. Respond as JSON with \
                     description, objects, tags, mood."
                );
                self.vision::<ImageAnalysis>(image_url, &request, &cfg, "Analyzed image").await
            })
            .await
    }

    pub async fn generate_alt_text(&self, image_url: &str, config: &TaskConfig) -> TaskResult<AltText> {
        let inputs = json!({ "imageUrl": image_url });
        self.rt
            .invoke(&ops::GENERATE_ALT_TEXT, config, inputs, |cfg| async move {
                let request = format!(
                    "Write concise alt text for this image, at most {} characters.",
                    crate::recovery::media::ALT_TEXT_MAX_CHARS
                );
                self.vision::<AltText>(image_url, &request, &cfg, "Generated alt text").await
            })
            .await
    }

    pub async fn extract_color_palette(&self, image_url: &str, config: &TaskConfig) -> TaskResult<ColorPalette> {
        let inputs = json!({ "imageUrl": image_url });
        self.rt
            .invoke(&ops::EXTRACT_COLOR_PALETTE, config, inputs, |cfg| async move {
                let request = "List the color palette of this image as hex codes (#RRGGBB), \
                               dominant color first.";
                self.vision::<ColorPalette>(image_url, request, &cfg, "Extracted color palette").await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::metering::Tier;
    use crate::tools::test_support::{runtime, Harness};

    #[tokio::test]
    async fn test_palette_from_vision_output() {
        let h = Harness::new(|m| m.on("color palette", "Dominant: #1a2b3c\nAlso #FFFFFF and teal"));
        let tool = MediaAnalyzer::new(runtime(&h));

        let result = tool.extract_color_palette("https://cdn.example.com/a.png", &h.config()).await;

        let palette = result.data.unwrap();
        assert_eq!(palette.colors, vec!["#1A2B3C".to_string(), "#FFFFFF".to_string()]);
        assert_eq!(palette.dominant, "#1A2B3C");
        assert!(h.llm.prompts()[0].contains("[image] https://cdn.example.com/a.png"));
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let h = Harness::new(|m| m);
        let tool = MediaAnalyzer::new(runtime(&h));

        let result = tool.generate_alt_text("file:///etc/passwd", &h.config()).await;

        assert_eq!(result.error_kind, Some(ErrorKind::InvalidInput));
        assert_eq!(h.llm.calls(), 0);
        assert_eq!(h.ledger.debit_count(), 0);
    }

    #[tokio::test]
    async fn test_free_tier_denied_media_analysis() {
        let h = Harness::with_tier(Tier::Free, |m| m);
        let tool = MediaAnalyzer::new(runtime(&h));

        let result = tool.analyze_image("https://x.test/i.jpg", None, &h.config()).await;

        assert_eq!(result.error_kind, Some(ErrorKind::AccessDenied));
        assert_eq!(h.ledger.check_count(), 0);
        assert_eq!(h.llm.calls(), 0);
    }
}
