//! The repair loop: call, validate, repair, repeat.
//!
//! [`RetryController`] drives a single loop invocation through
//! `Calling → Validating → (Repairing → Calling)* → terminal`. The initial
//! call is free; every corrective call consumes one unit of the
//! [`RetryConfig`] budget, so an invocation never makes more than
//! `budget + 1` generator calls.
//!
//! Validation failures are recovered locally by sending a repair prompt.
//! An empty completion, a transport error, a timeout or cancellation ends
//! the invocation immediately without building a repair prompt. Whether to
//! re-run the whole loop after a transport failure is the caller's policy,
//! see [`run_with_backoff`](RetryController::run_with_backoff).
//!
//! Each invocation owns its counter and current prompt, so one controller
//! can serve many concurrent invocations.

use crate::backoff::BackoffConfig;
use crate::error::RepairError;
use crate::events::{emit, Event, EventHandler};
use crate::generator::Generator;
use crate::repair::RepairPromptBuilder;
use crate::retry::RetryConfig;
use crate::schema::{validate_with, Record, Schema, ValidationError, ValidationOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How often an in-flight call checks the cancellation flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Why a loop invocation ended without a record.
#[derive(Error, Debug)]
pub enum FailureReason {
    /// Every allowed repair was spent and the last answer was still invalid.
    #[error("retry budget exhausted: {last_error}")]
    BudgetExhausted { last_error: ValidationError },

    /// Two consecutive answers failed with the same error description.
    /// Only reported when [`RetryConfig::stop_on_repeat`] is enabled.
    #[error("repair stalled on a repeated error: {last_error}")]
    Stagnated { last_error: ValidationError },

    /// The generator answered with no content.
    #[error("generator returned an empty response")]
    EmptyResponse,

    /// The generator could not be reached or failed (includes timeouts).
    #[error("transport failure: {0}")]
    Transport(#[source] RepairError),

    /// The cancellation flag was raised.
    #[error("loop was cancelled")]
    Cancelled,
}

impl FailureReason {
    /// The last validation error, for budget and stagnation failures.
    pub fn last_error(&self) -> Option<&ValidationError> {
        match self {
            FailureReason::BudgetExhausted { last_error }
            | FailureReason::Stagnated { last_error } => Some(last_error),
            _ => None,
        }
    }

    /// The transport error, if the loop died on the wire.
    pub fn transport_error(&self) -> Option<&RepairError> {
        match self {
            FailureReason::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Terminal result of one loop invocation.
#[derive(Debug)]
pub enum LoopOutcome {
    /// A record conforming to the schema.
    Success { record: Record, attempts_made: u32 },
    /// No conforming record was produced.
    Failure {
        reason: FailureReason,
        attempts_made: u32,
    },
}

impl LoopOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoopOutcome::Success { .. })
    }

    /// Number of generator calls made.
    pub fn attempts_made(&self) -> u32 {
        match self {
            LoopOutcome::Success { attempts_made, .. }
            | LoopOutcome::Failure { attempts_made, .. } => *attempts_made,
        }
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            LoopOutcome::Success { record, .. } => Some(record),
            LoopOutcome::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            LoopOutcome::Failure { reason, .. } => Some(reason),
            LoopOutcome::Success { .. } => None,
        }
    }

    /// Human-readable failure description, `None` on success.
    pub fn reason(&self) -> Option<String> {
        self.failure().map(|r| r.to_string())
    }

    pub fn into_result(self) -> std::result::Result<Record, FailureReason> {
        match self {
            LoopOutcome::Success { record, .. } => Ok(record),
            LoopOutcome::Failure { reason, .. } => Err(reason),
        }
    }
}

/// One generator call plus its validation.
struct Attempt {
    index: u32,
    prompt: String,
    raw_response: String,
    outcome: ValidationOutcome,
}

/// Drives the call/validate/repair loop against a [`Generator`].
///
/// # Example
///
/// ```no_run
/// use llm_repair_loop::{Generator, RetryConfig, RetryController};
/// use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
/// use llm_repair_loop::schema::customer;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let generator = Generator::builder("https://api.openai.com/v1")
///     .openai_with_key(std::env::var("OPENAI_API_KEY")?)
///     .build()?;
/// let controller = RetryController::new(generator, RetryConfig::new(5));
///
/// let schema = customer::customer_query();
/// let prompt = analysis_prompt(&json!({"query": "I forgot my password."}), &schema, StructureHint::Example)?;
/// let record = controller.run(&prompt, &schema, "gpt-4o").await.into_result()?;
/// println!("{}", record.to_json_pretty()?);
/// # Ok(())
/// # }
/// ```
pub struct RetryController {
    generator: Arc<Generator>,
    config: RetryConfig,
    repair: RepairPromptBuilder,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl RetryController {
    pub fn new(generator: impl Into<Arc<Generator>>, config: RetryConfig) -> Self {
        Self {
            generator: generator.into(),
            config,
            repair: RepairPromptBuilder::new(),
            cancellation: None,
            event_handler: None,
        }
    }

    pub fn with_repair_builder(mut self, builder: RepairPromptBuilder) -> Self {
        self.repair = builder;
        self
    }

    /// Set the cancellation flag. It is checked before every call and
    /// while a call is in flight.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Run the loop with the configured budget.
    pub async fn run(&self, initial_prompt: &str, schema: &Schema, model_id: &str) -> LoopOutcome {
        self.run_with_budget(initial_prompt, schema, model_id, self.config.budget)
            .await
    }

    /// Run the loop with an explicit repair budget for this invocation.
    pub async fn run_with_budget(
        &self,
        initial_prompt: &str,
        schema: &Schema,
        model_id: &str,
        budget: u32,
    ) -> LoopOutcome {
        emit(
            &self.event_handler,
            Event::LoopStart {
                schema: schema.name().to_string(),
                model: model_id.to_string(),
                budget,
            },
        );
        debug!(schema = schema.name(), model = model_id, budget, "starting repair loop");

        let mut prompt = initial_prompt.to_string();
        let mut repairs: u32 = 0;
        let mut calls: u32 = 0;
        let mut previous_error: Option<String> = None;

        loop {
            if self.is_cancelled() {
                warn!(attempt = repairs, "loop cancelled before generator call");
                return self.fail(FailureReason::Cancelled, calls);
            }

            emit(&self.event_handler, Event::AttemptStart { attempt: repairs });
            debug!(attempt = repairs, prompt_len = prompt.len(), "calling generator");
            calls = calls.saturating_add(1);

            let raw = match self.call(&prompt, schema, model_id).await {
                Ok(raw) => raw,
                Err(RepairError::EmptyResponse) => {
                    error!(attempt = repairs, "generator returned an empty response");
                    return self.fail(FailureReason::EmptyResponse, calls);
                }
                Err(RepairError::Cancelled) => {
                    warn!(attempt = repairs, "loop cancelled during generator call");
                    return self.fail(FailureReason::Cancelled, calls);
                }
                Err(err) => {
                    error!(attempt = repairs, error = %err, "generator call failed");
                    return self.fail(FailureReason::Transport(err), calls);
                }
            };

            let outcome = validate_with(schema, &raw, self.config.parse_mode);
            let attempt = Attempt {
                index: repairs,
                prompt,
                raw_response: raw,
                outcome,
            };
            emit(
                &self.event_handler,
                Event::AttemptEnd {
                    attempt: attempt.index,
                    valid: attempt.outcome.is_valid(),
                },
            );

            let last_error = match attempt.outcome {
                ValidationOutcome::Valid(record) => {
                    info!(
                        schema = schema.name(),
                        attempts = calls,
                        "generator output validated"
                    );
                    emit(
                        &self.event_handler,
                        Event::LoopEnd {
                            success: true,
                            attempts: calls,
                        },
                    );
                    return LoopOutcome::Success {
                        record,
                        attempts_made: calls,
                    };
                }
                ValidationOutcome::Invalid(err) => err,
            };

            let description = last_error.to_string();
            warn!(attempt = attempt.index, error = %description, "generator output failed validation");

            if repairs >= budget {
                error!(attempts = calls, "retry budget exhausted");
                return self.fail(FailureReason::BudgetExhausted { last_error }, calls);
            }
            if self.config.stop_on_repeat && previous_error.as_deref() == Some(description.as_str()) {
                error!(attempts = calls, "same validation error twice in a row");
                return self.fail(FailureReason::Stagnated { last_error }, calls);
            }

            repairs += 1;
            emit(
                &self.event_handler,
                Event::RepairStart {
                    attempt: repairs,
                    reason: description.clone(),
                },
            );
            prompt = self
                .repair
                .build(&attempt.prompt, &attempt.raw_response, &description);
            previous_error = Some(description);
        }
    }

    /// Run the loop, re-running it from the initial prompt when it ends in
    /// a transport failure that `backoff` considers retryable.
    ///
    /// Each re-run is a fresh invocation with a fresh budget. The returned
    /// outcome is that of the last invocation.
    pub async fn run_with_backoff(
        &self,
        initial_prompt: &str,
        schema: &Schema,
        model_id: &str,
        backoff: &BackoffConfig,
    ) -> LoopOutcome {
        let mut rerun = 0;
        loop {
            let outcome = self.run(initial_prompt, schema, model_id).await;

            let delay = match outcome.failure().and_then(FailureReason::transport_error) {
                Some(err) if rerun < backoff.max_reruns && backoff.is_retryable(err) => {
                    backoff.delay_for(rerun, err)
                }
                _ => return outcome,
            };

            warn!(
                rerun = rerun + 1,
                delay = ?delay,
                reason = ?outcome.reason(),
                "re-running loop after transport failure"
            );
            tokio::time::sleep(delay).await;
            rerun += 1;
        }
    }

    /// One generator call under the optional timeout, abandoned as soon as
    /// the cancellation flag is raised.
    async fn call(&self, prompt: &str, schema: &Schema, model_id: &str) -> crate::Result<String> {
        let call = async {
            match self.config.call_timeout {
                Some(limit) => {
                    let request = self.generator.complete_for(prompt, model_id, Some(schema));
                    match tokio::time::timeout(limit, request).await {
                        Ok(result) => result,
                        Err(_) => Err(RepairError::Timeout(limit)),
                    }
                }
                None => {
                    self.generator
                        .complete_for(prompt, model_id, Some(schema))
                        .await
                }
            }
        };

        match self.cancellation {
            Some(ref flag) => {
                tokio::select! {
                    result = call => result,
                    _ = wait_for_cancel(flag) => Err(RepairError::Cancelled),
                }
            }
            None => call.await,
        }
    }

    fn fail(&self, reason: FailureReason, calls: u32) -> LoopOutcome {
        emit(
            &self.event_handler,
            Event::LoopEnd {
                success: false,
                attempts: calls,
            },
        );
        LoopOutcome::Failure {
            reason,
            attempts_made: calls,
        }
    }
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("generator", &self.generator)
            .field("config", &self.config)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

async fn wait_for_cancel(flag: &AtomicBool) {
    let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        if flag.load(Ordering::Relaxed) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::backoff::JitterStrategy;
    use crate::events::FnEventHandler;
    use crate::schema::{customer, ViolationKind};
    use serde_json::json;
    use std::sync::Mutex;

    const MODEL: &str = "gpt-4o";

    fn valid_query(order_id: i64) -> String {
        json!({
            "name": "Joe User",
            "email": "joe.user@example.com",
            "query": "I forgot my password.",
            "order_id": order_id,
            "purchase_date": null,
            "priority": "low",
            "category": "information_request",
            "is_complaint": false,
            "tags": ["password", "account"]
        })
        .to_string()
    }

    fn controller(mock: &Arc<MockBackend>, config: RetryConfig) -> RetryController {
        let generator = Generator::builder("http://mock")
            .backend(mock.clone())
            .build()
            .unwrap();
        RetryController::new(generator, config)
    }

    fn recorder() -> (Arc<dyn EventHandler>, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |event: Event| {
            sink.lock().unwrap().push(event);
        }));
        (handler, seen)
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        for budget in [0, 1, 5] {
            let mock = Arc::new(MockBackend::fixed(valid_query(12345)));
            let outcome = controller(&mock, RetryConfig::new(budget))
                .run("analyze", &customer::customer_query(), MODEL)
                .await;
            assert!(outcome.is_success());
            assert_eq!(outcome.attempts_made(), 1);
            assert_eq!(mock.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_persistent_failure_makes_budget_plus_one_calls() {
        for budget in [0, 1, 3] {
            let mock = Arc::new(MockBackend::fixed("not json at all"));
            let outcome = controller(&mock, RetryConfig::new(budget))
                .run("analyze", &customer::customer_query(), MODEL)
                .await;
            assert_eq!(mock.calls(), budget as usize + 1);
            assert_eq!(outcome.attempts_made(), budget + 1);
            assert!(matches!(
                outcome.failure(),
                Some(FailureReason::BudgetExhausted { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_scenario_a_bound_violation_repaired() {
        let mock = Arc::new(MockBackend::new(vec![valid_query(5), valid_query(12345)]));
        let outcome = controller(&mock, RetryConfig::new(1))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;

        assert_eq!(outcome.attempts_made(), 2);
        let record = outcome.record().expect("success");
        assert_eq!(record.int("order_id"), Some(12345));

        let prompts = mock.prompts();
        assert_eq!(prompts[0], "analyze");
        assert!(prompts[1].contains("<original_prompt>\nanalyze\n</original_prompt>"));
        assert!(prompts[1].contains(&valid_query(5)));
        assert!(prompts[1].contains("order_id: value 5 below minimum 10000"));
    }

    #[test]
    fn test_scenario_b_zero_budget_fails_after_one_call() {
        let mock = Arc::new(MockBackend::new(vec![valid_query(5), valid_query(12345)]));
        let outcome = tokio_test::block_on(
            controller(&mock, RetryConfig::no_repair()).run(
                "analyze",
                &customer::customer_query(),
                MODEL,
            ),
        );

        assert_eq!(mock.calls(), 1);
        assert_eq!(outcome.attempts_made(), 1);
        let last = outcome.failure().and_then(FailureReason::last_error).unwrap();
        assert_eq!(last.violations().len(), 1);
        assert!(outcome.reason().unwrap().contains("below minimum 10000"));
    }

    #[tokio::test]
    async fn test_scenario_c_transport_failure_aborts_without_repair() {
        let mock = Arc::new(MockBackend::scripted(vec![
            MockReply::status(503),
            MockReply::text(valid_query(12345)),
        ]));
        let (handler, seen) = recorder();
        let outcome = controller(&mock, RetryConfig::new(5))
            .with_event_handler(handler)
            .run("analyze", &customer::customer_query(), MODEL)
            .await;

        assert_eq!(mock.calls(), 1);
        assert_eq!(outcome.attempts_made(), 1);
        let err = outcome.failure().and_then(FailureReason::transport_error).unwrap();
        assert!(matches!(err, RepairError::HttpError { status: 503, .. }));
        assert!(!seen
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::RepairStart { .. })));
    }

    #[tokio::test]
    async fn test_scenario_d_enum_violation_named() {
        let bad = valid_query(12345).replace("information_request", "unknown_category");
        let mock = Arc::new(MockBackend::fixed(bad));
        let outcome = controller(&mock, RetryConfig::no_repair())
            .run("analyze", &customer::customer_query(), MODEL)
            .await;

        let last = outcome.failure().and_then(FailureReason::last_error).unwrap();
        let violation = &last.violations()[0];
        assert_eq!(violation.field, "category");
        assert!(matches!(violation.kind, ViolationKind::NotInEnum { .. }));
        let reason = outcome.reason().unwrap();
        assert!(reason.contains("unknown_category"));
        assert!(reason.contains("refund_request, information_request, other"));
    }

    #[tokio::test]
    async fn test_empty_response_aborts_on_first_call() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::Empty]));
        let outcome = controller(&mock, RetryConfig::new(3))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(mock.calls(), 1);
        assert!(matches!(outcome.failure(), Some(FailureReason::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_transport_failure_mid_loop() {
        let mock = Arc::new(MockBackend::scripted(vec![
            MockReply::text("{}"),
            MockReply::status(500),
        ]));
        let outcome = controller(&mock, RetryConfig::new(3))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(outcome.attempts_made(), 2);
        assert!(matches!(outcome.failure(), Some(FailureReason::Transport(_))));
    }

    #[tokio::test]
    async fn test_failure_reports_error_of_final_attempt() {
        let mock = Arc::new(MockBackend::new(vec![valid_query(5), "not json".into()]));
        let outcome = controller(&mock, RetryConfig::new(1))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;

        assert_eq!(mock.calls(), 2);
        let last = outcome.failure().and_then(FailureReason::last_error).unwrap();
        assert!(last.is_parse_error());
        let reason = outcome.reason().unwrap();
        assert!(reason.contains("invalid JSON"));
        assert!(!reason.contains("below minimum"));
    }

    #[tokio::test]
    async fn test_failure_lists_every_violation() {
        let raw = json!({
            "email": "joe.user@example.com",
            "order_id": 99,
        })
        .to_string();
        let mock = Arc::new(MockBackend::fixed(raw));
        let outcome = controller(&mock, RetryConfig::no_repair())
            .run("analyze", &customer::user_input(), MODEL)
            .await;

        let reason = outcome.reason().unwrap();
        assert!(reason.contains("name: missing required field"));
        assert!(reason.contains("query: missing required field"));
        assert!(reason.contains("order_id: value 99 below minimum 10000"));
    }

    #[tokio::test]
    async fn test_repair_prompt_embeds_only_latest_attempt() {
        let mock = Arc::new(MockBackend::new(vec![
            "first bad".into(),
            "second bad".into(),
            valid_query(12345),
        ]));
        let outcome = controller(&mock, RetryConfig::new(2))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(outcome.attempts_made(), 3);

        let prompts = mock.prompts();
        let schema = customer::customer_query();
        let error = schema.validate("second bad").error().unwrap().to_string();
        assert_eq!(
            prompts[2],
            RepairPromptBuilder::new().build(&prompts[1], "second bad", &error)
        );
    }

    #[tokio::test]
    async fn test_stagnation_stops_early_when_enabled() {
        let mock = Arc::new(MockBackend::fixed(valid_query(5)));
        let outcome = controller(&mock, RetryConfig::new(5).stop_on_repeat())
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(mock.calls(), 2);
        assert!(matches!(outcome.failure(), Some(FailureReason::Stagnated { .. })));
    }

    #[tokio::test]
    async fn test_stagnation_off_by_default() {
        let mock = Arc::new(MockBackend::fixed(valid_query(5)));
        let outcome = controller(&mock, RetryConfig::new(3))
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(mock.calls(), 4);
        assert!(matches!(
            outcome.failure(),
            Some(FailureReason::BudgetExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_with_budget_overrides_config() {
        let mock = Arc::new(MockBackend::fixed("nope"));
        let outcome = controller(&mock, RetryConfig::new(5))
            .run_with_budget("analyze", &customer::customer_query(), MODEL, 1)
            .await;
        assert_eq!(outcome.attempts_made(), 2);
    }

    #[tokio::test]
    async fn test_lenient_mode_accepts_fenced_output() {
        let fenced = format!("Here you go:\n```json\n{}\n```", valid_query(12345));
        let mock = Arc::new(MockBackend::fixed(fenced));

        let strict = controller(&mock, RetryConfig::no_repair())
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert!(!strict.is_success());

        let lenient = controller(&mock, RetryConfig::no_repair().lenient())
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert!(lenient.is_success());
    }

    #[tokio::test]
    async fn test_events_sequence() {
        let mock = Arc::new(MockBackend::new(vec![valid_query(5), valid_query(12345)]));
        let (handler, seen) = recorder();
        controller(&mock, RetryConfig::new(1))
            .with_event_handler(handler)
            .run("analyze", &customer::customer_query(), MODEL)
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 7);
        assert!(matches!(seen[0], Event::LoopStart { budget: 1, .. }));
        assert!(matches!(seen[1], Event::AttemptStart { attempt: 0 }));
        assert!(matches!(seen[2], Event::AttemptEnd { attempt: 0, valid: false }));
        assert!(matches!(seen[3], Event::RepairStart { attempt: 1, .. }));
        assert!(matches!(seen[4], Event::AttemptStart { attempt: 1 }));
        assert!(matches!(seen[5], Event::AttemptEnd { attempt: 1, valid: true }));
        assert!(matches!(
            seen[6],
            Event::LoopEnd {
                success: true,
                attempts: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_call_timeout_is_transport_failure() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::delayed(
            Duration::from_secs(5),
            valid_query(12345),
        )]));
        let outcome = controller(
            &mock,
            RetryConfig::new(3).with_call_timeout(Duration::from_millis(20)),
        )
        .run("analyze", &customer::customer_query(), MODEL)
        .await;

        assert_eq!(outcome.attempts_made(), 1);
        let err = outcome.failure().and_then(FailureReason::transport_error).unwrap();
        assert!(matches!(err, RepairError::Timeout(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let mock = Arc::new(MockBackend::fixed(valid_query(12345)));
        let flag = Arc::new(AtomicBool::new(true));
        let outcome = controller(&mock, RetryConfig::new(3))
            .with_cancellation(flag)
            .run("analyze", &customer::customer_query(), MODEL)
            .await;
        assert_eq!(mock.calls(), 0);
        assert_eq!(outcome.attempts_made(), 0);
        assert!(matches!(outcome.failure(), Some(FailureReason::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::delayed(
            Duration::from_secs(10),
            valid_query(12345),
        )]));
        let flag = Arc::new(AtomicBool::new(false));
        let ctrl = controller(&mock, RetryConfig::new(3)).with_cancellation(flag.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag.store(true, Ordering::Relaxed);
        });
        let outcome = ctrl.run("analyze", &customer::customer_query(), MODEL).await;
        trigger.await.unwrap();

        assert_eq!(outcome.attempts_made(), 1);
        assert!(matches!(outcome.failure(), Some(FailureReason::Cancelled)));
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_independent() {
        let mock = Arc::new(MockBackend::fixed(valid_query(12345)));
        let ctrl = Arc::new(controller(&mock, RetryConfig::new(2)));
        let schema = customer::customer_query();

        let runs = (0..8).map(|i| {
            let ctrl = ctrl.clone();
            let schema = schema.clone();
            async move { ctrl.run(&format!("query {}", i), &schema, MODEL).await }
        });
        let outcomes = futures::future::join_all(runs).await;

        assert!(outcomes.iter().all(|o| o.is_success() && o.attempts_made() == 1));
        assert_eq!(mock.calls(), 8);
        let mut prompts = mock.prompts();
        prompts.sort();
        assert_eq!(prompts.len(), 8);
        assert_eq!(prompts[0], "query 0");
    }

    fn quick_backoff(max_reruns: u32) -> BackoffConfig {
        BackoffConfig {
            max_reruns,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: JitterStrategy::None,
            ..BackoffConfig::standard()
        }
    }

    #[tokio::test]
    async fn test_backoff_reruns_whole_loop_on_retryable_transport() {
        let mock = Arc::new(MockBackend::scripted(vec![
            MockReply::status(503),
            MockReply::text(valid_query(12345)),
        ]));
        let outcome = controller(&mock, RetryConfig::new(2))
            .run_with_backoff("analyze", &customer::customer_query(), MODEL, &quick_backoff(2))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts_made(), 1);
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.prompts(), vec!["analyze", "analyze"]);
    }

    #[tokio::test]
    async fn test_backoff_ignores_validation_and_non_retryable_failures() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::status(400)]));
        let outcome = controller(&mock, RetryConfig::new(2))
            .run_with_backoff("analyze", &customer::customer_query(), MODEL, &quick_backoff(3))
            .await;
        assert_eq!(mock.calls(), 1);
        assert!(matches!(outcome.failure(), Some(FailureReason::Transport(_))));

        let mock = Arc::new(MockBackend::fixed("nope"));
        let outcome = controller(&mock, RetryConfig::new(1))
            .run_with_backoff("analyze", &customer::customer_query(), MODEL, &quick_backoff(3))
            .await;
        assert_eq!(mock.calls(), 2);
        assert!(matches!(
            outcome.failure(),
            Some(FailureReason::BudgetExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_max_reruns() {
        let mock = Arc::new(MockBackend::scripted(vec![MockReply::status(429)]));
        let outcome = controller(&mock, RetryConfig::new(2))
            .run_with_backoff("analyze", &customer::customer_query(), MODEL, &quick_backoff(2))
            .await;
        assert_eq!(mock.calls(), 3);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_into_result() {
        let mock = Arc::new(MockBackend::fixed(valid_query(12345)));
        let record = controller(&mock, RetryConfig::new(0))
            .run("analyze", &customer::customer_query(), MODEL)
            .await
            .into_result()
            .unwrap();
        let typed: customer::CustomerQuery = record.parse_as().unwrap();
        assert_eq!(typed.category, customer::Category::InformationRequest);
    }
}
