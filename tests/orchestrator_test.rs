//! 编排器集成测试：单次计费、组合操作、等级闸门、缓存命中与批量执行

use std::sync::Arc;

use contentops::config::AppConfig;
use contentops::core::{BatchItem, ContextBuilder, ErrorKind, Orchestrator, TaskConfig, TaskError};
use contentops::llm::MockLlmClient;
use contentops::metering::{InMemoryLedger, StaticTierDirectory, Tier};
use contentops::rag::{InMemoryRetriever, Scope};
use contentops::workflow::{FnWorkflow, WorkflowFuture};
use serde_json::json;

struct Fixture {
    orch: Orchestrator,
    llm: Arc<MockLlmClient>,
    ledger: Arc<InMemoryLedger>,
}

fn fixture(directory: StaticTierDirectory, llm: MockLlmClient) -> Fixture {
    let llm = Arc::new(llm);
    let ledger = Arc::new(InMemoryLedger::new(20));
    let ctx = ContextBuilder::new(AppConfig::default())
        .with_llm(llm.clone())
        .with_ledger(ledger.clone())
        .with_tier_directory(Arc::new(directory))
        .build();
    Fixture {
        orch: Orchestrator::new(ctx),
        llm,
        ledger,
    }
}

fn content_pipeline() -> MockLlmClient {
    MockLlmClient::new()
        .on("refine the draft below", "Title: Brew Better\nA polished guide to brewing coffee at home.")
        .on("write the full draft", "Title: Brew Better\nStart with fresh beans. Grind just before brewing.")
        .on("create a detailed outline", "Title: Brew Better\n1. Beans\n2. Grind\n3. Water")
        .on("brainstorm", "1. Brew Better\n2. Coffee at Home\n3. The Perfect Cup")
}

#[tokio::test]
async fn test_content_creation_workflow_billed_once() {
    let f = fixture(StaticTierDirectory::new(Tier::Pro), content_pipeline());
    let cfg = TaskConfig::new("alice");

    let result = f
        .orch
        .execute_workflow("content-creation", json!({ "topic": "home coffee" }), &cfg)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(f.llm.calls(), 4);
    assert_eq!(f.ledger.debit_count_for("alice"), 1);
    assert_eq!(f.ledger.debits()[0].reason, "orchestrator:execute_workflow");
    assert_eq!(result.cost(), 1);

    let data = result.data.clone().unwrap();
    assert_eq!(data["title"], "Brew Better");
    assert_eq!(data["finalContent"], "A polished guide to brewing coffee at home.");
    assert!(result.process_steps.iter().any(|s| s == "Created outline"));
    assert!(result.process_steps.iter().any(|s| s == "Refined content"));
    assert!(result.token_usage.unwrap().total > 0);
}

#[tokio::test]
async fn test_workflow_step_failure_not_billed() {
    let llm = MockLlmClient::new()
        .fail_on("write the full draft")
        .on("create a detailed outline", "1. Beans\n2. Grind")
        .on("brainstorm", "1. Brew Better");
    let f = fixture(StaticTierDirectory::new(Tier::Pro), llm);

    let result = f
        .orch
        .execute_workflow("content-creation", json!({ "topic": "home coffee" }), &TaskConfig::new("alice"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ProviderFailure));
    assert!(result.error.unwrap().contains("draft"));
    assert_eq!(f.ledger.debit_count(), 0);
    assert!(result.process_steps.iter().any(|s| s == "Created outline"));
}

#[tokio::test]
async fn test_execute_task_workflow_route_billed_once() {
    let f = fixture(StaticTierDirectory::new(Tier::Enterprise), content_pipeline());

    let result = f
        .orch
        .execute_task(
            "workflow",
            json!({ "workflow": "content-creation", "inputs": { "topic": "home coffee" } }),
            &TaskConfig::new("alice"),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(f.ledger.debit_count(), 1);
    assert_eq!(f.ledger.debits()[0].reason, "orchestrator:execute_task");
}

#[tokio::test]
async fn test_multi_tool_analysis_partial_success() {
    let llm = MockLlmClient::new()
        .on("analyze the sentiment", r#"{"sentiment": "positive", "score": 0.7, "confidence": 0.9}"#)
        .on("extract the main topics", r#"{"topics": ["coffee", "brewing"], "keywords": ["beans"]}"#)
        .fail_on("review the quality");
    let f = fixture(StaticTierDirectory::new(Tier::Starter), llm);

    let result = f
        .orch
        .execute_task(
            "content-analysis",
            json!({
                "content": "Fresh beans make the best coffee.",
                "analysisTypes": ["sentiment", "topics", "quality", "vibes"]
            }),
            &TaskConfig::new("bob"),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    let data = result.data.clone().unwrap();
    assert_eq!(data["sentiment"]["sentiment"], "positive");
    assert_eq!(data["topics"]["topics"][0], "coffee");
    assert!(data.get("quality").is_none());
    assert!(result
        .process_steps
        .iter()
        .any(|s| s == "Skipped unsupported analysis type: vibes"));
    assert!(result.process_steps.iter().any(|s| s.starts_with("quality analysis failed")));
    assert_eq!(f.llm.calls(), 3);
    assert_eq!(result.cost(), 1);
    assert_eq!(f.ledger.debit_count_for("bob"), 1);
}

#[tokio::test]
async fn test_multi_tool_analysis_total_failure_not_billed() {
    let llm = MockLlmClient::new()
        .fail_on("analyze the sentiment")
        .fail_on("extract the main topics");
    let f = fixture(StaticTierDirectory::new(Tier::Pro), llm);

    let result = f
        .orch
        .multi_tool_analysis(
            "Some text",
            &["sentiment".to_string(), "topics".to_string()],
            &TaskConfig::new("bob"),
        )
        .await;

    assert!(!result.success);
    assert_eq!(f.ledger.debit_count(), 0);
}

#[tokio::test]
async fn test_tier_denial_precedes_balance_check() {
    let f = fixture(StaticTierDirectory::new(Tier::Free), content_pipeline());

    let result = f
        .orch
        .execute_task(
            "workflow",
            json!({ "workflow": "content-creation", "inputs": { "topic": "coffee" } }),
            &TaskConfig::new("carol"),
        )
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::AccessDenied));
    assert_eq!(f.ledger.check_count(), 0);
    assert_eq!(f.ledger.debit_count(), 0);
    assert_eq!(f.llm.calls(), 0);
}

#[tokio::test]
async fn test_organization_tier_overrides_user_tier() {
    let directory = StaticTierDirectory::new(Tier::Free).with_organization("acme", Tier::Pro);
    let f = fixture(directory, MockLlmClient::new().on("recommend the best posting times", "no idea"));

    let denied = f
        .orch
        .execute_task("schedule-optimization", json!({ "platform": "instagram" }), &TaskConfig::new("dave"))
        .await;
    assert_eq!(denied.error_kind, Some(ErrorKind::AccessDenied));

    let allowed = f
        .orch
        .execute_task(
            "schedule-optimization",
            json!({ "platform": "instagram" }),
            &TaskConfig::new("dave").with_organization("acme"),
        )
        .await;
    assert!(allowed.success, "{:?}", allowed.error);
    assert!(allowed
        .process_steps
        .iter()
        .any(|s| s == "Used best-practice posting windows for instagram"));
    assert_eq!(f.ledger.debit_count(), 1);
}

#[tokio::test]
async fn test_insufficient_balance_rejected_without_provider_call() {
    let llm = Arc::new(MockLlmClient::new());
    let ledger = Arc::new(InMemoryLedger::new(0));
    let ctx = ContextBuilder::new(AppConfig::default())
        .with_llm(llm.clone())
        .with_ledger(ledger.clone())
        .build();
    let orch = Orchestrator::new(ctx);

    let result = orch
        .execute_task("content-generation", json!({ "prompt": "launch post" }), &TaskConfig::new("erin"))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::InsufficientBalance));
    assert_eq!(llm.calls(), 0);
    assert_eq!(ledger.debit_count(), 0);
}

#[tokio::test]
async fn test_cache_hit_is_free_but_still_gated() {
    let llm = MockLlmClient::new().on("produce a piece of", "Title: Launch\nWe are live.");
    let f = fixture(StaticTierDirectory::new(Tier::Starter), llm);
    let inputs = json!({ "prompt": "announce the launch", "contentType": "email" });

    let first = f
        .orch
        .execute_task("content-generation", inputs.clone(), &TaskConfig::new("u1"))
        .await;
    let second = f
        .orch
        .execute_task("content-generation", inputs.clone(), &TaskConfig::new("u2"))
        .await;

    assert!(first.success && !first.cached);
    assert_eq!(first.cost(), 1);
    assert!(second.success && second.cached);
    assert_eq!(second.cost(), 0);
    assert_eq!(second.data, first.data);
    assert_eq!(f.llm.calls(), 1);
    assert_eq!(f.ledger.debit_count_for("u1"), 1);
    assert_eq!(f.ledger.debit_count_for("u2"), 0);
}

#[tokio::test]
async fn test_unknown_workflow_not_billed() {
    let f = fixture(StaticTierDirectory::new(Tier::Enterprise), MockLlmClient::new());

    let direct = f
        .orch
        .execute_workflow("does-not-exist", json!({}), &TaskConfig::new("u1"))
        .await;
    let routed = f
        .orch
        .execute_task("workflow", json!({ "workflow": "does-not-exist" }), &TaskConfig::new("u1"))
        .await;

    assert_eq!(direct.error_kind, Some(ErrorKind::UnknownOperation));
    assert_eq!(routed.error_kind, Some(ErrorKind::UnknownOperation));
    assert_eq!(f.ledger.check_count(), 0);
    assert_eq!(f.ledger.debit_count(), 0);
}

#[tokio::test]
async fn test_registered_workflow_runs_and_bills_once() {
    let llm = MockLlmClient::new()
        .on("analyze the sentiment", r#"{"sentiment": "neutral"}"#)
        .on("extract the main topics", r#"{"topics": ["pricing"]}"#);
    let f = fixture(StaticTierDirectory::new(Tier::Pro), llm);
    f.orch
        .register_workflow(
            "quick-scan",
            Arc::new(FnWorkflow::new("sentiment then topics", |ctx, inputs| {
                Box::pin(async move {
                    let text = inputs["text"].as_str().unwrap_or_default().to_string();
                    let sentiment = ctx.consume(
                        "sentiment",
                        ctx.toolkit.analysis.analyze_sentiment(&text, &ctx.config).await,
                    )?;
                    let topics = ctx.consume(
                        "topics",
                        ctx.toolkit.analysis.extract_topics(&text, &ctx.config).await,
                    )?;
                    Ok::<_, TaskError>(json!({ "sentiment": sentiment, "topics": topics }))
                }) as WorkflowFuture
            })),
        )
        .unwrap();

    let result = f
        .orch
        .execute_workflow("quick-scan", json!({ "text": "Is the price changing?" }), &TaskConfig::new("u1"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.clone().unwrap()["topics"]["topics"][0], "pricing");
    assert_eq!(f.llm.calls(), 2);
    assert_eq!(f.ledger.debit_count(), 1);
}

#[tokio::test]
async fn test_rag_generation_uses_retrieved_context() {
    let llm = Arc::new(MockLlmClient::new().on("produce a piece of", "Title: Roast Notes\nMedium roast suits espresso."));
    let ledger = Arc::new(InMemoryLedger::new(10));
    let retriever = Arc::new(InMemoryRetriever::new(llm.clone(), 100));
    retriever
        .index_document(
            "roasting-guide",
            "Medium roast coffee beans work well for espresso brewing",
            Scope::Global,
            Default::default(),
        )
        .await
        .unwrap();
    let ctx = ContextBuilder::new(AppConfig::default())
        .with_llm(llm.clone())
        .with_ledger(ledger.clone())
        .with_tier_directory(Arc::new(StaticTierDirectory::new(Tier::Pro)))
        .with_retriever(retriever)
        .build();
    let orch = Orchestrator::new(ctx);

    let result = orch
        .execute_task(
            "content-generation",
            json!({ "prompt": "Which coffee roast for espresso brewing?" }),
            &TaskConfig::new("u1").with_rag(),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.clone().unwrap()["sources"][0], "roasting-guide");
    assert!(result.process_steps.iter().any(|s| s == "Retrieved 1 documents"));
    assert!(llm.prompts().iter().any(|p| p.contains("Medium roast coffee beans")));
    assert_eq!(ledger.debit_count(), 1);
}

#[tokio::test]
async fn test_batch_counts_successes_and_failures() {
    let llm = MockLlmClient::new()
        .on("analyze the sentiment", r#"{"sentiment": "positive"}"#)
        .fail_on("produce a piece of");
    let f = fixture(StaticTierDirectory::new(Tier::Pro), llm);

    let report = f
        .orch
        .execute_batch(vec![
            BatchItem::new("content-analysis", json!({ "content": "great" }), TaskConfig::new("u1")),
            BatchItem::new("content-generation", json!({ "prompt": "x" }), TaskConfig::new("u2")),
            BatchItem::new("translate", json!({}), TaskConfig::new("u3")),
        ])
        .await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.items[2].error_kind, Some(ErrorKind::UnknownOperation));
    assert_eq!(f.ledger.debit_count(), 1);
    assert_eq!(f.ledger.debit_count_for("u1"), 1);
}
