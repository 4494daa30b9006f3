//! 计费层：权限闸门、Token 账本、操作策略表与计费包装器

pub mod access;
pub mod ledger;
pub mod meter;
pub mod policy;
pub mod record;

pub use access::{AccessGate, DirectoryError, Feature, StaticTierDirectory, Tier, TierDirectory};
pub use ledger::{DebitRecord, InMemoryLedger, LedgerError, TokenLedger};
pub use meter::{BillingDecision, Meter};
pub use policy::{ops, BillingPolicy, OperationSpec, OPERATION_TABLE};
pub use record::{Claim, OperationRecord};
