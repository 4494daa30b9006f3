//! 进程内检索器：文档分块、向量化存储、余弦相似度检索

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::RagSection;
use crate::llm::LlmClient;
use crate::rag::{Document, RetrievalError, Retriever, SearchFilters};

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: ["\n\n", "\n", ". ", "! ", "? ", "。", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// (块文本, 字符偏移)
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 按字符切分（UTF-8 安全），优先在分隔符处断开
    pub fn chunk(&self, text: &str) -> Vec<(String, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut current = 0;

        while current < total {
            let target_end = (current + size).min(total);
            let mut end = target_end;

            if target_end < total {
                let slice: String = chars[current..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if to_sep > 0 {
                            end = current + to_sep;
                            break;
                        }
                    }
                }
            }
            if end <= current {
                end = (current + 1).min(total);
            }

            let piece: String = chars[current..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push((trimmed.to_string(), current));
            }
            if end == total {
                break;
            }

            let overlap = self.config.chunk_overlap.min(end - current);
            let next = end.saturating_sub(overlap);
            current = if next > current { next } else { end };
        }
        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// 文档可见范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    User(String),
    Organization(String),
}

impl Scope {
    fn visible_to(&self, user_id: &str, org_id: Option<&str>) -> bool {
        match self {
            Scope::Global => true,
            Scope::User(owner) => owner == user_id,
            Scope::Organization(org) => org_id == Some(org.as_str()),
        }
    }
}

struct Entry {
    chunk_id: String,
    source_id: String,
    text: String,
    scope: Scope,
    metadata: HashMap<String, String>,
    embedding: Vec<f32>,
}

pub struct InMemoryRetriever {
    llm: Arc<dyn LlmClient>,
    chunker: Chunker,
    entries: RwLock<Vec<Entry>>,
    max_entries: usize,
}

impl InMemoryRetriever {
    pub fn new(llm: Arc<dyn LlmClient>, max_entries: usize) -> Self {
        Self {
            llm,
            chunker: Chunker::default(),
            entries: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, cfg: &RagSection) -> Self {
        Self::new(llm, cfg.max_entries).with_chunking_config(ChunkingConfig {
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
            ..Default::default()
        })
    }

    pub fn with_chunking_config(mut self, config: ChunkingConfig) -> Self {
        self.chunker = Chunker::new(config);
        self
    }

    /// 索引文档（同 ID 的旧版本先删除），返回写入的块数
    pub async fn index_document(
        &self,
        doc_id: &str,
        text: &str,
        scope: Scope,
        metadata: HashMap<String, String>,
    ) -> Result<usize, RetrievalError> {
        let mut fresh = Vec::new();
        for (i, (chunk, offset)) in self.chunker.chunk(text).into_iter().enumerate() {
            let embedding = self
                .llm
                .embed_text(&chunk)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
            if embedding.is_empty() {
                continue;
            }
            let mut metadata = metadata.clone();
            metadata.insert("offset".to_string(), offset.to_string());
            fresh.push(Entry {
                chunk_id: format!("{doc_id}_{i}"),
                source_id: doc_id.to_string(),
                text: chunk,
                scope: scope.clone(),
                metadata,
                embedding,
            });
        }

        let added = fresh.len();
        let mut entries = self.entries.write();
        entries.retain(|e| e.source_id != doc_id);
        entries.extend(fresh);
        if entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(0..overflow);
        }
        tracing::debug!(doc_id, chunks = added, "document indexed");
        Ok(added)
    }

    pub fn remove_document(&self, doc_id: &str) {
        self.entries.write().retain(|e| e.source_id != doc_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn similarity_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        user_id: &str,
        org_id: Option<&str>,
    ) -> Result<Vec<Document>, RetrievalError> {
        let query_embedding = self
            .llm
            .embed_text(query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|e| e.scope.visible_to(user_id, org_id))
            .filter(|e| {
                filters
                    .metadata
                    .iter()
                    .all(|(k, v)| e.metadata.get(k) == Some(v))
            })
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score > 0.0 && *score >= filters.min_score)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(filters.top_k)
            .map(|(score, e)| Document {
                id: e.chunk_id.clone(),
                source_id: e.source_id.clone(),
                content: e.text.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
