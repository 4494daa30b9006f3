//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONTENTOPS__*` 覆盖（双下划线表示嵌套，如 `CONTENTOPS__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub metering: MeteringSection,
    #[serde(default)]
    pub rag: RagSection,
    #[serde(default)]
    pub ledger: LedgerSection,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需要 OPENAI_API_KEY，否则回退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            embedding_model: default_embedding_model(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次 provider 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [cache] 段：容量与各工具类别的 TTL
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// 每个工具实例的最大条目数
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_content_ttl")]
    pub content_ttl_secs: u64,
    #[serde(default = "default_analysis_ttl")]
    pub analysis_ttl_secs: u64,
    /// 图像分析结果更稳定，缓存更久
    #[serde(default = "default_media_ttl")]
    pub media_ttl_secs: u64,
    #[serde(default = "default_response_ttl")]
    pub response_ttl_secs: u64,
    #[serde(default = "default_schedule_ttl")]
    pub schedule_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            content_ttl_secs: default_content_ttl(),
            analysis_ttl_secs: default_analysis_ttl(),
            media_ttl_secs: default_media_ttl(),
            response_ttl_secs: default_response_ttl(),
            schedule_ttl_secs: default_schedule_ttl(),
        }
    }
}

impl CacheSection {
    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }

    pub fn analysis_ttl(&self) -> Duration {
        Duration::from_secs(self.analysis_ttl_secs)
    }

    pub fn media_ttl(&self) -> Duration {
        Duration::from_secs(self.media_ttl_secs)
    }

    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    pub fn schedule_ttl(&self) -> Duration {
        Duration::from_secs(self.schedule_ttl_secs)
    }
}

fn default_cache_capacity() -> usize {
    500
}

fn default_content_ttl() -> u64 {
    3600
}

fn default_analysis_ttl() -> u64 {
    3600
}

fn default_media_ttl() -> u64 {
    86_400
}

fn default_response_ttl() -> u64 {
    7200
}

fn default_schedule_ttl() -> u64 {
    3600
}

/// [metering] 段
#[derive(Debug, Clone, Deserialize)]
pub struct MeteringSection {
    /// 去重集合上限，超出后整体清空
    #[serde(default = "default_operation_record_capacity")]
    pub operation_record_capacity: usize,
}

impl Default for MeteringSection {
    fn default() -> Self {
        Self {
            operation_record_capacity: default_operation_record_capacity(),
        }
    }
}

fn default_operation_record_capacity() -> usize {
    1000
}

/// [rag] 段：检索条数与内存检索器的分块参数
#[derive(Debug, Clone, Deserialize)]
pub struct RagSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_max_entries() -> usize {
    10_000
}

/// [ledger] 段：进程内账本（仅单实例 / 开发模式使用）
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_balance")]
    pub default_balance: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            default_balance: default_balance(),
        }
    }
}

fn default_balance() -> u64 {
    100
}

/// 从 config 目录加载配置，环境变量 CONTENTOPS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONTENTOPS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONTENTOPS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
