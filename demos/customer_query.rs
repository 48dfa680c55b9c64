//! Example: analyze a customer query with OpenAI and repair invalid output.
//!
//! Run with: `OPENAI_API_KEY=sk-... cargo run --example customer_query`
//! Add `-- --native` to also send the schema as a structured-output constraint.

use anyhow::Context;
use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
use llm_repair_loop::schema::customer::{self, CustomerQuery};
use llm_repair_loop::schema::validate_value;
use llm_repair_loop::{Generator, LlmConfig, RetryConfig, RetryController};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
    let native = std::env::args().any(|arg| arg == "--native");

    let user_input = json!({
        "name": "Joe User",
        "email": "joe.user@example.com",
        "query": "I forgot my password.",
        "order_id": null,
        "purchase_date": null
    });

    // Reject malformed input before spending any tokens on it
    if let Some(err) = validate_value(&customer::user_input(), &user_input).error() {
        anyhow::bail!("user input rejected:\n{}", err);
    }

    let generator = Generator::builder("https://api.openai.com/v1")
        .openai_with_key(api_key)
        .config(
            LlmConfig::default()
                .with_temperature(0.2)
                .with_json_mode(true)
                .with_native_schema(native),
        )
        .build()?;
    let controller = RetryController::new(
        generator,
        RetryConfig::new(5).with_call_timeout(Duration::from_secs(60)),
    );

    let schema = customer::customer_query();
    let prompt = analysis_prompt(&user_input, &schema, StructureHint::Example)?;

    let outcome = controller.run(&prompt, &schema, "gpt-4o").await;
    println!("Generator calls: {}", outcome.attempts_made());

    let record = outcome.into_result()?;
    println!("{}", record.to_json_pretty()?);

    let analysis: CustomerQuery = record.parse_as()?;
    println!(
        "\ncategory={:?} priority={} complaint={} tags={:?}",
        analysis.category, analysis.priority, analysis.is_complaint, analysis.tags
    );

    Ok(())
}
