//! 订阅等级与功能权限
//!
//! 静态权限表（tier × feature）；组织等级优先于用户等级，均未知时按 free 处理。
//! 权限拒绝在余额检查之前短路，且不计费。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{TaskConfig, TaskError};

/// 订阅等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// 该等级可使用的功能
    pub fn features(&self) -> &'static [Feature] {
        match self {
            Tier::Free => FREE_FEATURES,
            Tier::Starter => STARTER_FEATURES,
            Tier::Pro | Tier::Enterprise => ALL_FEATURES,
        }
    }

    pub fn allows(&self, feature: Feature) -> bool {
        self.features().contains(&feature)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "starter" | "basic" => Ok(Tier::Starter),
            "pro" | "professional" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(DirectoryError::UnknownTier(other.to_string())),
        }
    }
}

/// 受等级控制的功能
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    ContentGeneration,
    ContentAnalysis,
    ResponseAssistance,
    ScheduleOptimization,
    MediaAnalysis,
    MultiToolAnalysis,
    RagGeneration,
    Workflow,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ContentGeneration => "content-generation",
            Feature::ContentAnalysis => "content-analysis",
            Feature::ResponseAssistance => "response-assistance",
            Feature::ScheduleOptimization => "schedule-optimization",
            Feature::MediaAnalysis => "media-analysis",
            Feature::MultiToolAnalysis => "multi-tool-analysis",
            Feature::RagGeneration => "rag-generation",
            Feature::Workflow => "workflow",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const FREE_FEATURES: &[Feature] = &[
    Feature::ContentGeneration,
    Feature::ContentAnalysis,
    Feature::ResponseAssistance,
];

const STARTER_FEATURES: &[Feature] = &[
    Feature::ContentGeneration,
    Feature::ContentAnalysis,
    Feature::ResponseAssistance,
    Feature::ScheduleOptimization,
    Feature::MediaAnalysis,
    Feature::MultiToolAnalysis,
];

const ALL_FEATURES: &[Feature] = &[
    Feature::ContentGeneration,
    Feature::ContentAnalysis,
    Feature::ResponseAssistance,
    Feature::ScheduleOptimization,
    Feature::MediaAnalysis,
    Feature::MultiToolAnalysis,
    Feature::RagGeneration,
    Feature::Workflow,
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("subscription directory unavailable: {0}")]
    Unavailable(String),

    #[error("unknown tier '{0}'")]
    UnknownTier(String),
}

/// 订阅等级查询（外部服务边界）
#[async_trait]
pub trait TierDirectory: Send + Sync {
    async fn organization_tier(&self, org_id: &str) -> Result<Option<Tier>, DirectoryError>;

    /// 用户级等级（已废弃的回退路径，仅在没有组织等级时使用）
    async fn user_tier(&self, user_id: &str) -> Result<Option<Tier>, DirectoryError>;
}

/// 内存等级表，未登记的用户按 default_tier 处理
#[derive(Debug)]
pub struct StaticTierDirectory {
    users: RwLock<HashMap<String, Tier>>,
    organizations: RwLock<HashMap<String, Tier>>,
    default_tier: Tier,
}

impl Default for StaticTierDirectory {
    fn default() -> Self {
        Self::new(Tier::Free)
    }
}

impl StaticTierDirectory {
    pub fn new(default_tier: Tier) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            organizations: RwLock::new(HashMap::new()),
            default_tier,
        }
    }

    pub fn with_user(self, user_id: impl Into<String>, tier: Tier) -> Self {
        self.users.write().insert(user_id.into(), tier);
        self
    }

    pub fn with_organization(self, org_id: impl Into<String>, tier: Tier) -> Self {
        self.organizations.write().insert(org_id.into(), tier);
        self
    }

    pub fn set_user_tier(&self, user_id: &str, tier: Tier) {
        self.users.write().insert(user_id.to_string(), tier);
    }
}

#[async_trait]
impl TierDirectory for StaticTierDirectory {
    async fn organization_tier(&self, org_id: &str) -> Result<Option<Tier>, DirectoryError> {
        Ok(self.organizations.read().get(org_id).copied())
    }

    async fn user_tier(&self, user_id: &str) -> Result<Option<Tier>, DirectoryError> {
        Ok(Some(
            self.users
                .read()
                .get(user_id)
                .copied()
                .unwrap_or(self.default_tier),
        ))
    }
}

/// 权限闸门
#[derive(Clone)]
pub struct AccessGate {
    directory: Arc<dyn TierDirectory>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn TierDirectory>) -> Self {
        Self { directory }
    }

    /// 组织等级覆盖用户等级
    pub async fn resolve_tier(
        &self,
        user_id: &str,
        org_id: Option<&str>,
    ) -> Result<Tier, DirectoryError> {
        if let Some(org_id) = org_id {
            if let Some(tier) = self.directory.organization_tier(org_id).await? {
                return Ok(tier);
            }
        }
        Ok(self.directory.user_tier(user_id).await?.unwrap_or(Tier::Free))
    }

    /// 校验调用方等级是否可使用 feature，返回解析出的等级
    pub async fn check(&self, config: &TaskConfig, feature: Feature) -> Result<Tier, TaskError> {
        let tier = self
            .resolve_tier(&config.user_id, config.organization_id.as_deref())
            .await?;
        if tier.allows(feature) {
            Ok(tier)
        } else {
            tracing::info!(user_id = %config.user_id, %tier, %feature, "access denied");
            Err(TaskError::AccessDenied { tier, feature })
        }
    }
}
