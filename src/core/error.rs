//! 任务错误分类
//!
//! 除 Provider 失败外，其余错误都在调用 provider 之前短路；所有错误都不计费。
//! 结构化输出解析失败不属于错误：由 recovery 层吸收为降级结果。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;
use crate::metering::{DirectoryError, Feature, LedgerError, Tier};
use crate::rag::RetrievalError;

/// 任务执行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// 订阅等级无权使用该功能
    #[error("access denied: tier '{tier}' cannot use '{feature}'")]
    AccessDenied { tier: Tier, feature: Feature },

    #[error("insufficient token balance for user {user_id}")]
    InsufficientBalance { user_id: String },

    #[error("provider failure: {0}")]
    Provider(#[from] LlmError),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 余额检查本身失败（账本不可达等）
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("tier lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("task cancelled")]
    Cancelled,

    /// 组合操作中某一步失败
    #[error("step '{step}' failed: {message}")]
    StepFailed {
        step: String,
        kind: ErrorKind,
        message: String,
    },
}

/// 稳定的错误类别，随 TaskResult 返回给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    InsufficientBalance,
    ProviderFailure,
    UnknownOperation,
    InvalidInput,
    LedgerUnavailable,
    RetrievalFailure,
    Cancelled,
}

impl ErrorKind {
    /// 审计日志中的 outcome 字段
    pub fn as_outcome(&self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::ProviderFailure => "provider_failure",
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::LedgerUnavailable => "ledger_unavailable",
            ErrorKind::RetrievalFailure => "retrieval_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::AccessDenied { .. } => ErrorKind::AccessDenied,
            TaskError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            TaskError::Provider(_) => ErrorKind::ProviderFailure,
            TaskError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            TaskError::InvalidInput(_) => ErrorKind::InvalidInput,
            TaskError::Ledger(_) | TaskError::Directory(_) => ErrorKind::LedgerUnavailable,
            TaskError::Retrieval(_) => ErrorKind::RetrievalFailure,
            TaskError::Cancelled => ErrorKind::Cancelled,
            TaskError::StepFailed { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_distinguish_access_and_balance() {
        let denied = TaskError::AccessDenied {
            tier: Tier::Free,
            feature: Feature::Workflow,
        };
        let broke = TaskError::InsufficientBalance {
            user_id: "u1".to_string(),
        };
        assert_eq!(denied.kind(), ErrorKind::AccessDenied);
        assert_eq!(broke.kind(), ErrorKind::InsufficientBalance);
        assert!(denied.to_string().contains("workflow"));
    }

    #[test]
    fn test_provider_error_converts() {
        let err: TaskError = LlmError::Timeout(30).into();
        assert_eq!(err.kind(), ErrorKind::ProviderFailure);
        assert!(err.to_string().contains("30s"));
    }
}
