//! 检索能力边界（RAG）
//!
//! 编排层只依赖 `Retriever`：按查询取回排好序的文档，并把文档拼成上下文文本。
//! `InMemoryRetriever` 是进程内实现：分块 + 向量化 + 余弦相似度。

pub mod store;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::{Chunker, ChunkingConfig, InMemoryRetriever, Scope};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

/// 检索到的文档片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub source_id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// 检索过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub top_k: usize,
    pub min_score: f32,
    /// 元数据需全部匹配
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SearchFilters {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            ..Default::default()
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// 返回按相似度降序排列的文档；只包含 user / org 可见的文档
    async fn similarity_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        user_id: &str,
        org_id: Option<&str>,
    ) -> Result<Vec<Document>, RetrievalError>;

    /// 把文档拼成可嵌入 prompt 的上下文
    fn generate_context(&self, documents: &[Document]) -> String {
        let mut context = String::new();
        for (i, doc) in documents.iter().enumerate() {
            context.push_str(&format!(
                "[Context {}] (relevance: {:.2})\n{}\n\n",
                i + 1,
                doc.score,
                doc.content
            ));
        }
        context.trim_end().to_string()
    }
}
