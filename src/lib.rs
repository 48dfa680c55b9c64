//! # LLM Repair Loop
//!
//! Coerce an unreliable LLM completion endpoint into producing JSON that
//! conforms to a fixed schema.
//!
//! Give the loop a schema and a prompt. It calls the model, validates the
//! answer, and when validation fails it sends a corrective follow-up prompt
//! showing the model its own bad output and the exact validation error. It
//! repeats up to a configured budget before giving up. Callers receive
//! either a validated [`Record`] or a [`FailureReason`], never unchecked
//! model output.
//!
//! ## Core Concepts
//!
//! - **[`Schema`]** — named, ordered fields with types and constraints.
//!   Schemas can extend a base schema; the field list is flattened.
//! - **[`validate`]** — raw text in, [`ValidationOutcome`] out. Every
//!   failing field is reported in one pass.
//! - **[`Generator`]** — one prompt in, raw text out, over a pluggable
//!   [`Backend`](backend::Backend) (OpenAI-compatible, Ollama, mock).
//! - **[`RepairPromptBuilder`]** — deterministic corrective prompt.
//! - **[`RetryController`]** — the loop itself, configured by
//!   [`RetryConfig`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
//! use llm_repair_loop::schema::customer::{self, CustomerQuery};
//! use llm_repair_loop::{Generator, LlmConfig, RetryConfig, RetryController};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = Generator::builder("https://api.openai.com/v1")
//!         .openai_with_key(std::env::var("OPENAI_API_KEY")?)
//!         .config(LlmConfig::default().with_json_mode(true))
//!         .build()?;
//!     let controller = RetryController::new(generator, RetryConfig::new(5));
//!
//!     let schema = customer::customer_query();
//!     let input = json!({"name": "Joe User", "query": "I forgot my password."});
//!     let prompt = analysis_prompt(&input, &schema, StructureHint::Example)?;
//!
//!     let record = controller.run(&prompt, &schema, "gpt-4o").await.into_result()?;
//!     let analysis: CustomerQuery = record.parse_as()?;
//!     println!("{:?}", analysis.category);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod extract;
pub mod generator;
pub mod prompt;
pub mod repair;
pub mod retry;
pub mod schema;

pub use backend::{MockBackend, OllamaBackend, OpenAiBackend};
pub use backoff::BackoffConfig;
pub use config::LlmConfig;
pub use controller::{FailureReason, LoopOutcome, RetryController};
pub use error::{RepairError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use generator::{Generator, GeneratorBuilder};
pub use repair::RepairPromptBuilder;
pub use retry::RetryConfig;
pub use schema::{
    validate, Field, FieldType, ParseMode, Record, Schema, SchemaBuilder, ValidationError,
    ValidationOutcome, Violation, ViolationKind,
};
