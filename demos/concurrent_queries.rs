//! Example: run several loops at once against a local Ollama server.
//!
//! Run with: `cargo run --example concurrent_queries`
//! Set `OLLAMA_URL` and `OLLAMA_MODEL` to override the defaults.

use futures::future::join_all;
use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
use llm_repair_loop::schema::customer;
use llm_repair_loop::{BackoffConfig, Generator, LlmConfig, RetryConfig, RetryController};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let base_url =
        std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string());

    let generator = Generator::builder(base_url)
        .ollama()
        .config(LlmConfig::default().with_json_mode(true))
        .build()?;
    let controller = Arc::new(RetryController::new(generator, RetryConfig::new(3).lenient()));
    let schema = customer::customer_query();
    let backoff = BackoffConfig::interactive();

    let queries = [
        "I forgot my password.",
        "Order 48213 arrived broken, I want my money back!",
        "Do you ship to Canada?",
    ];

    let runs = queries.iter().map(|query| {
        let controller = controller.clone();
        let schema = schema.clone();
        let backoff = backoff.clone();
        let model = model.clone();
        async move {
            let input = json!({"name": "Joe User", "email": "joe.user@example.com", "query": query});
            let prompt = analysis_prompt(&input, &schema, StructureHint::Example)?;
            let outcome = controller
                .run_with_backoff(&prompt, &schema, &model, &backoff)
                .await;
            anyhow::Ok((*query, outcome))
        }
    });

    for result in join_all(runs).await {
        let (query, outcome) = result?;
        match outcome.record() {
            Some(record) => println!(
                "{:<50} -> {} ({} calls)",
                query,
                record.str("category").unwrap_or("?"),
                outcome.attempts_made()
            ),
            None => println!(
                "{:<50} -> failed: {}",
                query,
                outcome.reason().unwrap_or_default()
            ),
        }
    }

    Ok(())
}
