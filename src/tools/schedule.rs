//! 发布时间优化

use serde_json::json;

use crate::core::{TaskConfig, TaskError, TaskResult};
use crate::metering::ops;
use crate::recovery::{Recovered, RecoverySource, ScheduleRecommendation};
use crate::tools::runtime::{into_result, ToolRuntime};

pub struct ScheduleOptimizer {
    rt: ToolRuntime,
}

impl ScheduleOptimizer {
    pub fn new(rt: ToolRuntime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.rt
    }

    /// 推荐发布时段；模型未给出可用时段时使用平台的通用最佳实践
    pub async fn optimize_schedule(
        &self,
        platform: &str,
        audience: Option<&str>,
        config: &TaskConfig,
    ) -> TaskResult<ScheduleRecommendation> {
        let platform = platform.trim().to_lowercase();
        let audience = audience.map(str::trim).filter(|a| !a.is_empty()).unwrap_or("a general audience");
        let inputs = json!({ "platform": platform, "audience": audience });
        self.rt
            .invoke(&ops::OPTIMIZE_SCHEDULE, config, inputs, |cfg| async move {
                let request = format!(
                    "Recommend the best posting times on {platform} for {audience}. \
                     Respond as JSON with slots [{{day, time}}], frequency, rationale."
                );
                let (recovered, usage) = self.rt.recover_from::<ScheduleRecommendation>(&request, &cfg).await?;
                if recovered.source == RecoverySource::Default || recovered.value.slots.is_empty() {
                    let fallback = Recovered {
                        value: ScheduleRecommendation::best_practice(&platform),
                        source: RecoverySource::Sections,
                    };
                    let mut result = into_result(fallback, usage, "Optimized posting schedule");
                    result.step(format!("Used best-practice posting windows for {platform}"));
                    return Ok(result);
                }
                let recovered = Recovered {
                    value: recovered.value.for_platform(&platform),
                    source: recovered.source,
                };
                Ok::<_, TaskError>(into_result(recovered, usage, "Optimized posting schedule"))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering::Tier;
    use crate::recovery::PostingSlot;
    use crate::tools::test_support::{runtime, Harness};

    #[tokio::test]
    async fn test_schedule_from_model() {
        let h = Harness::new(|m| {
            m.on(
                "best posting times",
                r#"{"slots": [{"day": "Mon", "time": "9am"}], "frequency": "daily"}"#,
            )
        });
        let tool = ScheduleOptimizer::new(runtime(&h));

        let result = tool.optimize_schedule("Instagram", None, &h.config()).await;

        let schedule = result.data.unwrap();
        assert_eq!(schedule.platform, "instagram");
        assert_eq!(schedule.slots, vec![PostingSlot::new("Monday", "09:00")]);
    }

    #[tokio::test]
    async fn test_unusable_output_uses_best_practice() {
        let h = Harness::new(|m| m.on("best posting times", "It depends."));
        let tool = ScheduleOptimizer::new(runtime(&h));

        let result = tool.optimize_schedule("linkedin", Some("CTOs"), &h.config()).await;

        assert!(result.success);
        assert_eq!(result.data.unwrap(), ScheduleRecommendation::best_practice("linkedin"));
        assert_eq!(h.ledger.debit_count(), 1);
    }

    #[tokio::test]
    async fn test_free_tier_cannot_optimize() {
        let h = Harness::with_tier(Tier::Free, |m| m);
        let tool = ScheduleOptimizer::new(runtime(&h));

        let result = tool.optimize_schedule("x", None, &h.config()).await;

        assert_eq!(result.error_kind, Some(crate::core::ErrorKind::AccessDenied));
    }
}
