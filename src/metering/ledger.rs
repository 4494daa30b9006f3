//! Token 账本边界
//!
//! 引擎自身不维护余额，只调用账本的「余额是否充足」与「原子扣费」两个接口。
//! InMemoryLedger 是进程内实现，供单实例部署、离线运行与测试使用。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("debit rejected: {0}")]
    Rejected(String),
}

/// 账本接口：扣费调用需由实现方保证原子与幂等安全
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn has_sufficient_tokens(
        &self,
        user_id: &str,
        cost: u64,
        org_id: Option<&str>,
    ) -> Result<bool, LedgerError>;

    async fn use_tokens(
        &self,
        user_id: &str,
        reason: &str,
        cost: u64,
        org_id: Option<&str>,
    ) -> Result<(), LedgerError>;
}

/// 一次成功扣费
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitRecord {
    pub user_id: String,
    pub org_id: Option<String>,
    pub reason: String,
    pub cost: u64,
}

/// 进程内账本：组织调用从组织余额扣，否则从用户余额扣
#[derive(Debug)]
pub struct InMemoryLedger {
    default_balance: u64,
    balances: Mutex<HashMap<String, u64>>,
    debits: Mutex<Vec<DebitRecord>>,
    checks: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(default_balance: u64) -> Self {
        Self {
            default_balance,
            balances: Mutex::new(HashMap::new()),
            debits: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
        }
    }

    /// 设置账户余额；组织账户用 `org:<id>`
    pub fn with_balance(self, account: impl Into<String>, balance: u64) -> Self {
        self.balances.lock().insert(account.into(), balance);
        self
    }

    pub fn balance(&self, account: &str) -> u64 {
        self.balances
            .lock()
            .get(account)
            .copied()
            .unwrap_or(self.default_balance)
    }

    pub fn debits(&self) -> Vec<DebitRecord> {
        self.debits.lock().clone()
    }

    pub fn debit_count(&self) -> usize {
        self.debits.lock().len()
    }

    pub fn debit_count_for(&self, user_id: &str) -> usize {
        self.debits
            .lock()
            .iter()
            .filter(|d| d.user_id == user_id)
            .count()
    }

    /// has_sufficient_tokens 被调用的次数
    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    fn account(user_id: &str, org_id: Option<&str>) -> String {
        match org_id {
            Some(org) => format!("org:{org}"),
            None => user_id.to_string(),
        }
    }
}

#[async_trait]
impl TokenLedger for InMemoryLedger {
    async fn has_sufficient_tokens(
        &self,
        user_id: &str,
        cost: u64,
        org_id: Option<&str>,
    ) -> Result<bool, LedgerError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance(&Self::account(user_id, org_id)) >= cost)
    }

    async fn use_tokens(
        &self,
        user_id: &str,
        reason: &str,
        cost: u64,
        org_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        let account = Self::account(user_id, org_id);
        {
            let mut balances = self.balances.lock();
            let balance = balances.entry(account.clone()).or_insert(self.default_balance);
            if *balance < cost {
                return Err(LedgerError::Rejected(format!(
                    "account {account} has {balance} tokens, needs {cost}"
                )));
            }
            *balance -= cost;
        }
        self.debits.lock().push(DebitRecord {
            user_id: user_id.to_string(),
            org_id: org_id.map(str::to_string),
            reason: reason.to_string(),
            cost,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_reduces_balance_and_records() {
        let ledger = InMemoryLedger::new(0).with_balance("u1", 2);
        assert!(ledger.has_sufficient_tokens("u1", 1, None).await.unwrap());
        ledger.use_tokens("u1", "content:generate_post", 1, None).await.unwrap();
        assert_eq!(ledger.balance("u1"), 1);
        assert_eq!(ledger.debit_count_for("u1"), 1);
        assert_eq!(ledger.check_count(), 1);
    }

    #[tokio::test]
    async fn test_org_account_is_separate() {
        let ledger = InMemoryLedger::new(0).with_balance("org:acme", 5);
        assert!(!ledger.has_sufficient_tokens("u1", 1, None).await.unwrap());
        assert!(ledger.has_sufficient_tokens("u1", 1, Some("acme")).await.unwrap());
        ledger.use_tokens("u1", "x", 1, Some("acme")).await.unwrap();
        assert_eq!(ledger.balance("org:acme"), 4);
    }

    #[tokio::test]
    async fn test_overdraft_rejected() {
        let ledger = InMemoryLedger::new(0);
        let err = ledger.use_tokens("u1", "x", 1, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert_eq!(ledger.debit_count(), 0);
    }
}
