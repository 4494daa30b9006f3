//! 计费包装器
//!
//! 包裹每个已声明操作：确定操作 ID → 判定计费（自动 / 组合子步骤 / 已计费 / 需计费）→
//! 权限闸门 → 余额检查 → 执行 → 成功且未命中缓存时扣费 1 → 输出 JSON 审计日志。
//! 失败（返回 Err 或 success = false）从不扣费，并释放本次尝试；同 ID 的其他尝试成功时仍扣费一次。

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::core::{TaskConfig, TaskError, TaskResult, OPERATION_COST};
use crate::metering::policy::{self, OperationSpec};
use crate::metering::record::{Claim, OperationRecord};
use crate::metering::{AccessGate, TokenLedger};

/// 计费判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingDecision {
    /// 自动 / 免费操作
    Automatic,
    /// 作为已登记父操作的子步骤
    Composite { parent: String },
    /// 同一操作 ID 已扣过费
    AlreadyRecorded,
    /// 成功后扣费（同 ID 并发尝试中最先成功者）
    Charge,
}

impl BillingDecision {
    pub fn is_billed(&self) -> bool {
        matches!(self, BillingDecision::Charge)
    }

    fn label(&self) -> &'static str {
        match self {
            BillingDecision::Automatic => "automatic",
            BillingDecision::Composite { .. } => "composite",
            BillingDecision::AlreadyRecorded => "already_recorded",
            BillingDecision::Charge => "charge",
        }
    }
}

pub struct Meter {
    gate: AccessGate,
    ledger: Arc<dyn TokenLedger>,
    record: OperationRecord,
    sequence: AtomicU64,
}

impl Meter {
    pub fn new(gate: AccessGate, ledger: Arc<dyn TokenLedger>, record_capacity: usize) -> Self {
        Self {
            gate,
            ledger,
            record: OperationRecord::new(record_capacity),
            sequence: AtomicU64::new(0),
        }
    }

    /// 按名称查找操作声明
    pub fn policy_for(&self, name: &str) -> Option<&'static OperationSpec> {
        policy::lookup(name)
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn record(&self) -> &OperationRecord {
        &self.record
    }

    /// 上游传入的操作 ID，否则合成 `{user}_{category}_{method}_{timestamp_ms}_{seq}`
    pub fn operation_id(&self, spec: &OperationSpec, config: &TaskConfig) -> String {
        if let Some(id) = config.operation_id() {
            return id.to_string();
        }
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{}_{}_{}",
            config.user_id,
            spec.category,
            spec.name,
            chrono::Utc::now().timestamp_millis(),
            seq
        )
    }

    /// 执行前判定：权限拒绝先于余额检查，二者都在执行之前短路
    pub async fn authorize(
        &self,
        spec: &OperationSpec,
        config: &TaskConfig,
        operation_id: &str,
    ) -> Result<BillingDecision, TaskError> {
        if spec.is_automatic() {
            return Ok(BillingDecision::Automatic);
        }
        if spec.is_composite_call(config) {
            let parent = config.parent_operation().unwrap_or_default().to_string();
            tracing::debug!(operation = spec.name, %parent, "composite sub-operation, billing skipped");
            return Ok(BillingDecision::Composite { parent });
        }

        self.gate.check(config, spec.feature).await?;

        if self.record.is_charged(operation_id) {
            tracing::debug!(operation = spec.name, operation_id, "operation already charged");
            return Ok(BillingDecision::AlreadyRecorded);
        }

        let org_id = config.organization_id.as_deref();
        let sufficient = self
            .ledger
            .has_sufficient_tokens(&config.user_id, OPERATION_COST, org_id)
            .await?;
        if !sufficient {
            return Err(TaskError::InsufficientBalance {
                user_id: config.user_id.clone(),
            });
        }

        match self.record.begin(operation_id) {
            Claim::Charged => Ok(BillingDecision::AlreadyRecorded),
            Claim::Pending => {
                tracing::debug!(operation = spec.name, operation_id, "concurrent attempt of in-flight operation");
                Ok(BillingDecision::Charge)
            }
            Claim::Fresh => Ok(BillingDecision::Charge),
        }
    }

    /// 包裹一次操作调用；`op` 收到打好子调用标签的配置
    pub async fn run<T, F, Fut>(&self, spec: &OperationSpec, config: &TaskConfig, op: F) -> TaskResult<T>
    where
        F: FnOnce(TaskConfig) -> Fut,
        Fut: Future<Output = Result<TaskResult<T>, TaskError>>,
    {
        let start = Instant::now();
        let operation_id = self.operation_id(spec, config);

        let decision = match self.authorize(spec, config, &operation_id).await {
            Ok(decision) => decision,
            Err(err) => {
                let mut rejected = TaskResult::failure(&err);
                rejected.execution_time_ms = start.elapsed().as_millis() as u64;
                self.audit(spec, &operation_id, config, None, false, false, err.kind().as_outcome(), start);
                return rejected;
            }
        };

        let child = config.tagged(&operation_id, spec.name);
        let mut result = match op(child).await {
            Ok(result) => result,
            Err(err) => TaskResult::failure(&err),
        };

        let mut usage = result.token_usage.unwrap_or_default();
        usage.cost = 0;
        let mut charged = false;

        if decision.is_billed() {
            // 同 ID 的并发尝试中，只有最先成功的那次扣费
            if result.success && !result.cached && self.record.commit(&operation_id) {
                match self
                    .ledger
                    .use_tokens(
                        &config.user_id,
                        &spec.reason(),
                        OPERATION_COST,
                        config.organization_id.as_deref(),
                    )
                    .await
                {
                    Ok(()) => {
                        usage.cost = OPERATION_COST;
                        charged = true;
                    }
                    Err(e) => {
                        self.record.revoke(&operation_id);
                        tracing::warn!(
                            operation = spec.name,
                            operation_id = %operation_id,
                            user_id = %config.user_id,
                            "token debit failed after success: {}",
                            e
                        );
                    }
                }
            } else {
                self.record.release(&operation_id);
            }
        }

        result.token_usage = Some(usage);
        result.execution_time_ms = start.elapsed().as_millis() as u64;

        let outcome = if !result.success {
            result
                .error_kind
                .map(|kind| kind.as_outcome())
                .unwrap_or("error")
        } else if result.cached {
            "cached"
        } else {
            "ok"
        };
        self.audit(
            spec,
            &operation_id,
            config,
            Some(&decision),
            charged,
            result.success,
            outcome,
            start,
        );

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        spec: &OperationSpec,
        operation_id: &str,
        config: &TaskConfig,
        decision: Option<&BillingDecision>,
        charged: bool,
        success: bool,
        outcome: &str,
        start: Instant,
    ) {
        let audit = serde_json::json!({
            "event": "metering_audit",
            "operation": spec.name,
            "operation_id": operation_id,
            "user_id": config.user_id,
            "billed": decision.is_some_and(BillingDecision::is_billed),
            "decision": decision.map(BillingDecision::label).unwrap_or("rejected"),
            "charged": charged,
            "success": success,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "metering");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, TokenUsage};
    use crate::llm::LlmError;
    use crate::metering::policy::ops;
    use crate::metering::{InMemoryLedger, StaticTierDirectory, Tier};

    fn meter_with(ledger: Arc<InMemoryLedger>, tier: Tier) -> Meter {
        let directory = StaticTierDirectory::new(tier);
        Meter::new(AccessGate::new(Arc::new(directory)), ledger, 1000)
    }

    fn ok_result(text: &str) -> Result<TaskResult<String>, TaskError> {
        Ok(TaskResult::ok(text.to_string()).with_usage(TokenUsage {
            prompt: 10,
            completion: 5,
            total: 15,
            cost: 0,
        }))
    }

    #[tokio::test]
    async fn test_direct_call_is_billed_once() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1");

        let result = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async { ok_result("post") })
            .await;

        assert!(result.success);
        assert_eq!(result.cost(), 1);
        assert_eq!(result.token_usage.unwrap().total, 15);
        assert_eq!(ledger.debit_count_for("u1"), 1);
        assert_eq!(ledger.debits()[0].reason, "content:generate_post");
    }

    #[tokio::test]
    async fn test_failure_is_never_billed() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1");

        let result: TaskResult<String> = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async {
                Err(TaskError::Provider(LlmError::Unavailable("down".into())))
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::ProviderFailure));
        assert_eq!(result.cost(), 0);
        assert_eq!(ledger.debit_count(), 0);
        assert!(meter.record().is_empty());
    }

    #[tokio::test]
    async fn test_composite_child_not_billed() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Pro);
        let cfg = TaskConfig::new("u1");

        let result = meter
            .run(&ops::EXECUTE_WORKFLOW, &cfg, |child| {
                let meter = &meter;
                async move {
                    assert_eq!(child.parent_operation(), Some("execute_workflow"));
                    let a = meter
                        .run(&ops::GENERATE_OUTLINE, &child, |_| async { ok_result("o") })
                        .await;
                    let b = meter
                        .run(&ops::WRITE_DRAFT, &child, |_| async { ok_result("d") })
                        .await;
                    assert_eq!(a.cost() + b.cost(), 0);
                    ok_result("done")
                }
            })
            .await;

        assert!(result.success);
        assert_eq!(result.cost(), 1);
        assert_eq!(ledger.debit_count_for("u1"), 1);
    }

    #[tokio::test]
    async fn test_access_denied_skips_balance_check() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1");

        let result = meter
            .run(&ops::EXECUTE_WORKFLOW, &cfg, |_| async { ok_result("never") })
            .await;

        assert_eq!(result.error_kind, Some(ErrorKind::AccessDenied));
        assert_eq!(ledger.check_count(), 0);
        assert_eq!(ledger.debit_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_does_not_execute() {
        let ledger = Arc::new(InMemoryLedger::new(0));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let executed = std::sync::atomic::AtomicBool::new(false);

        let result = meter
            .run(&ops::ANALYZE_SENTIMENT, &TaskConfig::new("u1"), |_| async {
                executed.store(true, Ordering::SeqCst);
                ok_result("x")
            })
            .await;

        assert_eq!(result.error_kind, Some(ErrorKind::InsufficientBalance));
        assert!(!executed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cached_result_has_zero_cost() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);

        let result = meter
            .run(&ops::ANALYZE_SENTIMENT, &TaskConfig::new("u1"), |_| async {
                Ok(TaskResult::from_cache("hit".to_string()))
            })
            .await;

        assert!(result.success && result.cached);
        assert_eq!(result.cost(), 0);
        assert_eq!(ledger.debit_count(), 0);
        assert_eq!(ledger.check_count(), 1);
    }

    #[tokio::test]
    async fn test_same_operation_id_billed_once() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1").with_metadata("operationId", "retry-1");

        let first = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async { ok_result("a") })
            .await;
        let second = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async { ok_result("a") })
            .await;

        assert_eq!(first.cost(), 1);
        assert_eq!(second.cost(), 0);
        assert_eq!(ledger.debit_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_releases_operation_id_for_retry() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1").with_metadata("operationId", "retry-2");

        let failed: TaskResult<String> = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async {
                Err(TaskError::Provider(LlmError::Timeout(1)))
            })
            .await;
        assert!(!failed.success);

        let retried = meter
            .run(&ops::GENERATE_POST, &cfg, |_| async { ok_result("a") })
            .await;
        assert_eq!(retried.cost(), 1);
        assert_eq!(ledger.debit_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_succeeding_after_owner_fails_is_billed() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1").with_metadata("operationId", "retry-x");

        let owner = meter.run(&ops::GENERATE_CONTENT, &cfg, |_| async {
            tokio::task::yield_now().await;
            Err::<TaskResult<String>, _>(TaskError::Provider(LlmError::Unavailable("down".into())))
        });
        let duplicate = meter.run(&ops::GENERATE_CONTENT, &cfg, |_| async {
            tokio::task::yield_now().await;
            ok_result("b")
        });
        let (owner, duplicate) = tokio::join!(owner, duplicate);

        assert!(!owner.success);
        assert!(duplicate.success);
        assert_eq!(duplicate.cost(), 1);
        assert_eq!(ledger.debit_count(), 1);
        assert!(meter.record().is_charged("retry-x"));
    }

    #[tokio::test]
    async fn test_concurrent_successes_share_one_charge() {
        let ledger = Arc::new(InMemoryLedger::new(10));
        let meter = meter_with(ledger.clone(), Tier::Free);
        let cfg = TaskConfig::new("u1").with_metadata("operationId", "retry-y");

        let a = meter.run(&ops::GENERATE_CONTENT, &cfg, |_| async {
            tokio::task::yield_now().await;
            ok_result("c")
        });
        let b = meter.run(&ops::GENERATE_CONTENT, &cfg, |_| async {
            tokio::task::yield_now().await;
            ok_result("c")
        });
        let (a, b) = tokio::join!(a, b);

        assert!(a.success && b.success);
        assert_eq!(a.cost() + b.cost(), 1);
        assert_eq!(ledger.debit_count(), 1);
        assert_eq!(ledger.check_count(), 2);
    }

    #[tokio::test]
    async fn test_automatic_operation_is_free() {
        let ledger = Arc::new(InMemoryLedger::new(0));
        let meter = meter_with(ledger.clone(), Tier::Free);

        let result = meter
            .run(&ops::SANITIZE_INPUT, &TaskConfig::new("u1"), |_| async {
                ok_result("clean")
            })
            .await;

        assert!(result.success);
        assert_eq!(result.cost(), 0);
        assert_eq!(ledger.check_count(), 0);
    }

    #[test]
    fn test_policy_lookup() {
        let ledger = Arc::new(InMemoryLedger::new(0));
        let meter = meter_with(ledger, Tier::Free);
        assert_eq!(meter.policy_for("generate_post"), Some(&ops::GENERATE_POST));
        assert!(meter.policy_for("nope").is_none());
    }
}
