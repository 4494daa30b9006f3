//! Tool Set：面向领域的请求 / 响应工具
//!
//! 每个工具方法都是一个已声明的计费操作（见 `metering::policy::ops`），内部流程一致：
//! 计费判定 → 缓存查找 → provider 调用 → 结构化恢复 → 缓存写入。
//! 每个工具持有自己的结果缓存，TTL 按类别取自 `[cache]` 配置。

pub mod analysis;
pub mod content;
pub mod media;
pub mod response;
pub mod runtime;
pub mod schedule;

use std::sync::Arc;

use crate::cache::CacheStats;
use crate::config::CacheSection;
use crate::core::{TaskConfig, TaskError, TaskResult};
use crate::llm::LlmClient;
use crate::metering::{ops, Meter};

pub use analysis::{AnalysisKind, ContentAnalyzer};
pub use content::ContentGenerator;
pub use media::MediaAnalyzer;
pub use response::ResponseAssistant;
pub use runtime::{sanitize, ToolRuntime, MAX_INPUT_CHARS};
pub use schedule::ScheduleOptimizer;

/// 全部工具的集合，由编排上下文构造并共享
pub struct Toolkit {
    pub content: ContentGenerator,
    pub analysis: ContentAnalyzer,
    pub media: MediaAnalyzer,
    pub response: ResponseAssistant,
    pub schedule: ScheduleOptimizer,
    meter: Arc<Meter>,
}

impl Toolkit {
    pub fn new(llm: Arc<dyn LlmClient>, meter: Arc<Meter>, cache: &CacheSection) -> Self {
        let rt = |ttl| ToolRuntime::new(llm.clone(), meter.clone(), cache.capacity, ttl);
        Self {
            content: ContentGenerator::new(rt(cache.content_ttl())),
            analysis: ContentAnalyzer::new(rt(cache.analysis_ttl())),
            media: MediaAnalyzer::new(rt(cache.media_ttl())),
            response: ResponseAssistant::new(rt(cache.response_ttl())),
            schedule: ScheduleOptimizer::new(rt(cache.schedule_ttl())),
            meter,
        }
    }

    pub fn meter(&self) -> &Arc<Meter> {
        &self.meter
    }

    /// 免费操作：输入清洗
    pub async fn sanitize_input(&self, text: &str, config: &TaskConfig) -> TaskResult<String> {
        self.meter
            .run(&ops::SANITIZE_INPUT, config, |_| async move { sanitize(text).map(TaskResult::ok) })
            .await
    }

    /// 免费操作：记录一条用户活动
    pub async fn log_activity(&self, activity: &str, config: &TaskConfig) -> TaskResult<()> {
        self.meter
            .run(&ops::LOG_ACTIVITY, config, |cfg| async move {
                tracing::info!(
                    user_id = %cfg.user_id,
                    organization_id = cfg.organization_id.as_deref().unwrap_or("-"),
                    parent = cfg.parent_operation().unwrap_or("-"),
                    "activity: {}",
                    activity
                );
                Ok::<_, TaskError>(TaskResult::ok(()))
            })
            .await
    }

    /// 各工具缓存统计，按工具名
    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            ("content", self.content.runtime().cache().stats()),
            ("analysis", self.analysis.runtime().cache().stats()),
            ("media", self.media.runtime().cache().stats()),
            ("response", self.response.runtime().cache().stats()),
            ("schedule", self.schedule.runtime().cache().stats()),
        ]
    }

    /// 清理所有工具缓存中的过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        self.runtimes().iter().map(|rt| rt.cache().purge_expired()).sum()
    }

    pub fn clear_caches(&self) {
        for rt in self.runtimes() {
            rt.cache().clear();
        }
    }

    fn runtimes(&self) -> [&ToolRuntime; 5] {
        [
            self.content.runtime(),
            self.analysis.runtime(),
            self.media.runtime(),
            self.response.runtime(),
            self.schedule.runtime(),
        ]
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core::TaskConfig;
    use crate::llm::MockLlmClient;
    use crate::metering::{AccessGate, InMemoryLedger, Meter, StaticTierDirectory, Tier};
    use crate::tools::ToolRuntime;

    pub struct Harness {
        pub llm: Arc<MockLlmClient>,
        pub ledger: Arc<InMemoryLedger>,
        pub meter: Arc<Meter>,
    }

    impl Harness {
        pub fn new(script: impl FnOnce(MockLlmClient) -> MockLlmClient) -> Self {
            Self::with_tier(Tier::Enterprise, script)
        }

        pub fn with_tier(tier: Tier, script: impl FnOnce(MockLlmClient) -> MockLlmClient) -> Self {
            let llm = Arc::new(script(MockLlmClient::new()));
            let ledger = Arc::new(InMemoryLedger::new(100));
            let gate = AccessGate::new(Arc::new(StaticTierDirectory::new(tier)));
            let meter = Arc::new(Meter::new(gate, ledger.clone(), 1000));
            Self { llm, ledger, meter }
        }

        pub fn config(&self) -> TaskConfig {
            TaskConfig::new("user-1")
        }
    }

    pub fn runtime(h: &Harness) -> ToolRuntime {
        ToolRuntime::new(h.llm.clone(), h.meter.clone(), 100, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::config::CacheSection;

    fn toolkit(h: &Harness) -> Toolkit {
        Toolkit::new(h.llm.clone(), h.meter.clone(), &CacheSection::default())
    }

    #[tokio::test]
    async fn test_automatic_operations_are_free() {
        let h = Harness::new(|m| m);
        let kit = toolkit(&h);
        let cfg = h.config();

        let cleaned = kit.sanitize_input("  hello\u{0000} ", &cfg).await;
        let logged = kit.log_activity("opened dashboard", &cfg).await;

        assert_eq!(cleaned.data.as_deref(), Some("hello"));
        assert!(logged.success);
        assert_eq!(h.ledger.check_count(), 0);
        assert_eq!(h.ledger.debit_count(), 0);
    }

    #[tokio::test]
    async fn test_media_cache_uses_longer_ttl() {
        let h = Harness::new(|m| m);
        let kit = toolkit(&h);
        let defaults = CacheSection::default();

        assert_eq!(kit.media.runtime().cache().default_ttl(), defaults.media_ttl());
        assert_eq!(kit.response.runtime().cache().default_ttl(), defaults.response_ttl());
        assert_eq!(kit.cache_stats().len(), 5);
        assert_eq!(kit.purge_expired(), 0);
    }
}
