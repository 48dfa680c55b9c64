//! Lifecycle hooks for the repair loop.
//!
//! Provides an optional, non-intrusive way to observe a loop invocation.
//! The controller emits an event when the loop starts, around every
//! generator call, before each repair and when the loop ends. Implement
//! [`EventHandler`] to receive them for progress reporting or metrics.
//! Structured logging goes through `tracing` independently of this hook.

use std::sync::Arc;

/// Events emitted during a loop invocation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A loop invocation has started.
    LoopStart {
        /// Name of the schema the output must conform to.
        schema: String,
        /// Model id passed to the generator.
        model: String,
        /// Maximum number of repair attempts.
        budget: u32,
    },
    /// A generator call is about to be made.
    AttemptStart {
        /// Attempt index: 0 is the initial call, 1.. are repairs.
        attempt: u32,
    },
    /// A generator call returned and its output was validated.
    AttemptEnd {
        attempt: u32,
        /// Whether the output conformed to the schema.
        valid: bool,
    },
    /// A repair prompt was built and is about to be sent.
    RepairStart {
        /// The repair attempt number (1-indexed).
        attempt: u32,
        /// The validation error that triggered the repair.
        reason: String,
    },
    /// The loop invocation has terminated.
    LoopEnd {
        /// Whether a conforming record was produced.
        success: bool,
        /// Total number of generator calls made.
        attempts: u32,
    },
}

/// Handler for loop lifecycle events.
///
/// This is entirely optional -- the controller works without one.
///
/// # Example
///
/// ```
/// use llm_repair_loop::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::RepairStart { attempt, reason } => {
///                 println!("[repair {}] {}", attempt, reason)
///             }
///             Event::LoopEnd { success, attempts } => {
///                 println!("[end] success={} calls={}", success, attempts)
///             }
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the controller emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use llm_repair_loop::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::AttemptEnd { attempt, valid } = event {
///         println!("attempt {} valid={}", attempt, valid);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
