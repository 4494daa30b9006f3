//! 结果缓存
//!
//! 每个工具实例持有一个 `ResultCache`：按插入顺序保存条目，读取时惰性过期，
//! 超出容量时淘汰最早插入的条目。缓存命中不产生 provider 调用，也不扣费。

pub mod key;

use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Instant;

pub use key::{cache_key, normalize};

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct Inner<V> {
    entries: IndexMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// 有界 TTL 缓存（FIFO 淘汰）
#[derive(Debug)]
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                tracing::debug!(key, "cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.shift_remove(key);
            inner.stats.expirations += 1;
        }
        inner.stats.misses += 1;
        tracing::debug!(key, expired, "cache miss");
        None
    }

    /// 写入条目；ttl 为空时使用默认 TTL。重复写入同一键会把它移到队尾
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut inner = self.inner.lock();
        inner.entries.shift_remove(&key);
        while inner.entries.len() >= self.capacity {
            if inner.entries.shift_remove_index(0).is_none() {
                break;
            }
            inner.stats.evictions += 1;
        }
        inner.entries.insert(key, CacheEntry { value, expires_at });
        inner.stats.inserts += 1;
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().entries.shift_remove(key).is_some()
    }

    /// 主动清理已过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - inner.entries.len();
        inner.stats.expirations += purged as u64;
        purged
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}
