//! Example: watch the repair loop fix a bad answer, no live LLM needed.
//!
//! Run with: `cargo run --example mock_repair`

use llm_repair_loop::backend::{MockBackend, MockReply};
use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
use llm_repair_loop::schema::customer;
use llm_repair_loop::{Event, FnEventHandler, Generator, RetryConfig, RetryController};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // First answer: order id out of range and a category the schema doesn't allow
    let bad = json!({
        "name": "Joe User",
        "email": "joe.user@example.com",
        "query": "My monitor arrived cracked, order 5.",
        "order_id": 5,
        "purchase_date": "2025-11-02",
        "priority": "high",
        "category": "exchange",
        "is_complaint": true,
        "tags": ["monitor", "damaged"]
    });
    let mut good = bad.clone();
    good["order_id"] = json!(48213);
    good["category"] = json!("refund_request");

    let mock = Arc::new(MockBackend::scripted(vec![
        MockReply::text(bad.to_string()),
        MockReply::text(good.to_string()),
    ]));

    let generator = Generator::builder("http://unused")
        .backend(mock.clone())
        .build()?;
    let controller = RetryController::new(generator, RetryConfig::new(3)).with_event_handler(
        Arc::new(FnEventHandler(|event: Event| match event {
            Event::RepairStart { attempt, reason } => {
                println!("[repair {}]\n{}\n", attempt, reason)
            }
            Event::LoopEnd { success, attempts } => {
                println!("[end] success={} calls={}", success, attempts)
            }
            _ => {}
        })),
    );

    let schema = customer::customer_query();
    let input = json!({"name": "Joe User", "query": "My monitor arrived cracked, order 5."});
    let prompt = analysis_prompt(&input, &schema, StructureHint::Example)?;

    let record = controller.run(&prompt, &schema, "mock").await.into_result()?;
    println!("\nValidated record:\n{}", record.to_json_pretty()?);

    println!("\nRepair prompt that was sent:\n{}", mock.prompts()[1]);
    Ok(())
}
