//! 计费包装器集成测试：重复操作 ID、并发去重、组合父操作、组织账户扣费

use std::sync::Arc;

use contentops::core::{ErrorKind, TaskConfig, TaskError, TaskResult, META_OPERATION_ID};
use contentops::metering::{ops, AccessGate, InMemoryLedger, Meter, StaticTierDirectory, Tier, OPERATION_TABLE};
use futures_util::future::join_all;

fn meter(ledger: Arc<InMemoryLedger>, directory: StaticTierDirectory) -> Meter {
    Meter::new(AccessGate::new(Arc::new(directory)), ledger, 100)
}

/// 让出一次调度，使 join_all 中的调用真正交错执行
async fn succeed(_: TaskConfig) -> Result<TaskResult<u32>, TaskError> {
    tokio::task::yield_now().await;
    Ok(TaskResult::ok(7))
}

async fn fail(_: TaskConfig) -> Result<TaskResult<u32>, TaskError> {
    tokio::task::yield_now().await;
    Err(TaskError::InvalidInput("flaky".into()))
}

#[tokio::test]
async fn test_concurrent_calls_with_same_operation_id_billed_once() {
    let ledger = Arc::new(InMemoryLedger::new(10));
    let meter = meter(ledger.clone(), StaticTierDirectory::new(Tier::Pro));
    let cfg = TaskConfig::new("u1").with_metadata(META_OPERATION_ID, "client-retry-42");

    let results = join_all((0..4).map(|_| meter.run(&ops::GENERATE_CONTENT, &cfg, succeed))).await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(results.iter().map(|r| r.cost()).sum::<u64>(), 1);
    assert_eq!(ledger.debit_count(), 1);
    assert_eq!(ledger.balance("u1"), 9);
}

#[tokio::test]
async fn test_in_flight_retry_billed_when_owner_fails() {
    let ledger = Arc::new(InMemoryLedger::new(10));
    let meter = meter(ledger.clone(), StaticTierDirectory::new(Tier::Pro));
    let cfg = TaskConfig::new("u1").with_metadata(META_OPERATION_ID, "client-retry-43");

    let (owner, retry) = tokio::join!(
        meter.run(&ops::GENERATE_CONTENT, &cfg, fail),
        meter.run(&ops::GENERATE_CONTENT, &cfg, succeed),
    );

    assert!(!owner.success);
    assert!(retry.success);
    assert_eq!(retry.cost(), 1);
    assert_eq!(ledger.debit_count(), 1);
    assert_eq!(ledger.balance("u1"), 9);
}

#[tokio::test]
async fn test_distinct_calls_billed_separately() {
    let ledger = Arc::new(InMemoryLedger::new(10));
    let meter = meter(ledger.clone(), StaticTierDirectory::new(Tier::Free));
    let cfg = TaskConfig::new("u1");

    meter.run(&ops::ANALYZE_SENTIMENT, &cfg, succeed).await;
    meter.run(&ops::ANALYZE_SENTIMENT, &cfg, succeed).await;

    assert_eq!(ledger.debit_count_for("u1"), 2);
}

#[tokio::test]
async fn test_undeclared_parent_does_not_suppress_billing() {
    let ledger = Arc::new(InMemoryLedger::new(10));
    let meter = meter(ledger.clone(), StaticTierDirectory::new(Tier::Pro));
    // summarize_thread 只登记了 execute_workflow 作为组合父操作
    let cfg = TaskConfig::new("u1").with_metadata("parentOperation", "multi_tool_analysis");

    let result = meter.run(&ops::SUMMARIZE_THREAD, &cfg, succeed).await;

    assert_eq!(result.cost(), 1);
    assert_eq!(ledger.debit_count(), 1);
}

#[tokio::test]
async fn test_organization_account_is_debited() {
    let ledger = Arc::new(InMemoryLedger::new(0).with_balance("org:org-acme", 3));
    let directory = StaticTierDirectory::new(Tier::Free).with_organization("org-acme", Tier::Enterprise);
    let meter = meter(ledger.clone(), directory);
    let cfg = TaskConfig::new("member").with_organization("org-acme");

    let result = meter.run(&ops::EXECUTE_WORKFLOW, &cfg, succeed).await;

    assert!(result.success);
    assert_eq!(ledger.balance("org:org-acme"), 2);
    assert_eq!(ledger.debits()[0].org_id.as_deref(), Some("org-acme"));
}

#[tokio::test]
async fn test_unsuccessful_result_is_not_billed() {
    let ledger = Arc::new(InMemoryLedger::new(10));
    let meter = meter(ledger.clone(), StaticTierDirectory::new(Tier::Free));

    let result: TaskResult<u32> = meter
        .run(&ops::GENERATE_POST, &TaskConfig::new("u1"), |_| async {
            Ok(TaskResult::failure(&TaskError::InvalidInput("empty".into())))
        })
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::InvalidInput));
    assert_eq!(ledger.debit_count(), 0);
}

#[test]
fn test_every_billable_operation_is_declared_once() {
    let billable = OPERATION_TABLE.iter().filter(|s| !s.is_automatic()).count();
    let automatic = OPERATION_TABLE.iter().filter(|s| s.is_automatic()).count();
    assert_eq!(automatic, 3);
    assert_eq!(billable + automatic, OPERATION_TABLE.len());
    assert!(OPERATION_TABLE.iter().any(|s| s.name == "execute_task"));
}
