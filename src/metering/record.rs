//! 操作 ID 登记表（进程内，有界）
//!
//! 每个 ID 处于两种状态之一：执行中（记录并发尝试数）或已扣费。
//! 同一逻辑操作的多次尝试里，最先成功并 `commit` 的那次扣费，其余免费；
//! 全部尝试失败时条目被移除，之后的重试仍可计费一次。
//! 超出容量后整体清空；只用于一次请求生命周期内的去重。

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    InFlight { attempts: usize },
    Charged,
}

/// `begin` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// 首次尝试
    Fresh,
    /// 同 ID 已有尝试在执行
    Pending,
    /// 同 ID 已扣过费
    Charged,
}

#[derive(Debug)]
pub struct OperationRecord {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl OperationRecord {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 该 ID 是否已扣费
    pub fn is_charged(&self, operation_id: &str) -> bool {
        matches!(self.entries.lock().get(operation_id), Some(Entry::Charged))
    }

    /// 登记一次尝试
    pub fn begin(&self, operation_id: &str) -> Claim {
        let mut entries = self.entries.lock();
        match entries.get_mut(operation_id) {
            Some(Entry::Charged) => Claim::Charged,
            Some(Entry::InFlight { attempts }) => {
                *attempts += 1;
                Claim::Pending
            }
            None => {
                if entries.len() >= self.capacity {
                    tracing::debug!(capacity = self.capacity, "operation record full, clearing");
                    entries.clear();
                }
                entries.insert(operation_id.to_string(), Entry::InFlight { attempts: 1 });
                Claim::Fresh
            }
        }
    }

    /// 成功的尝试申请扣费；返回 true 表示由本次尝试扣费
    pub fn commit(&self, operation_id: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(operation_id) {
            Some(Entry::Charged) => false,
            _ => {
                entries.insert(operation_id.to_string(), Entry::Charged);
                true
            }
        }
    }

    /// 未扣费地结束一次尝试；最后一个执行中的尝试结束时移除条目
    pub fn release(&self, operation_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(Entry::InFlight { attempts }) = entries.get_mut(operation_id) {
            *attempts = attempts.saturating_sub(1);
            if *attempts == 0 {
                entries.remove(operation_id);
            }
        }
    }

    /// 扣费失败时撤销 `commit`
    pub fn revoke(&self, operation_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(Entry::Charged) = entries.get(operation_id) {
            entries.remove(operation_id);
        }
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.entries.lock().contains_key(operation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
