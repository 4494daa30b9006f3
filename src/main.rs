//! ContentOps 命令行入口
//!
//! 用法：
//! - `contentops <task-type> '<inputs-json>' [user-id]`：执行一次任务并输出 JSON 结果
//! - `contentops ops`：列出已声明的操作与计费策略
//! - `contentops workflows`：列出已注册的工作流
//!
//! 未设置 OPENAI_API_KEY 时使用 Mock 后端，便于离线演示。

use anyhow::Context;
use contentops::config::{load_config, AppConfig};
use contentops::core::{ContextBuilder, Orchestrator, TaskConfig};
use contentops::metering::OPERATION_TABLE;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    contentops::observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("usage: contentops <task-type> '<inputs-json>' [user-id] | ops | workflows");
        std::process::exit(2);
    };

    if command == "ops" {
        for spec in OPERATION_TABLE {
            println!(
                "{:<26} {:<13} {:<24} {}",
                spec.name,
                spec.category,
                spec.feature.as_str(),
                if spec.is_automatic() { "automatic" } else { "billable" }
            );
        }
        return Ok(());
    }

    let orchestrator = Orchestrator::new(ContextBuilder::new(config).build());
    if command == "workflows" {
        for name in orchestrator.workflow_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let inputs: serde_json::Value = match args.get(1) {
        Some(raw) => serde_json::from_str(raw).context("inputs must be a JSON object")?,
        None => serde_json::json!({}),
    };
    let user_id = args.get(2).map(String::as_str).unwrap_or("local-user");
    // 每次命令行调用是一个独立的逻辑操作
    let task_config = TaskConfig::new(user_id).with_metadata("operationId", uuid::Uuid::new_v4().to_string());

    let result = orchestrator.execute_task(command, inputs, &task_config).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
