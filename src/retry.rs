//! Retry policy for the repair loop.
//!
//! [`RetryConfig`] bounds how many corrective follow-up calls a single loop
//! invocation may make after the initial call, and carries the knobs that
//! shape when the loop gives up early.

use crate::schema::ParseMode;
use std::time::Duration;

/// Configuration for one [`RetryController`](crate::RetryController).
///
/// The budget counts repair attempts only: the initial generator call is
/// free, so a budget of `n` allows at most `n + 1` calls.
///
/// # Example
///
/// ```
/// use llm_repair_loop::retry::RetryConfig;
/// use std::time::Duration;
///
/// // Up to 5 repairs after the initial call
/// let config = RetryConfig::new(5);
/// assert_eq!(config.max_calls(), 6);
///
/// // Give up when the model keeps making the same mistake
/// let config = RetryConfig::new(3)
///     .stop_on_repeat()
///     .with_call_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum repair attempts (not counting the initial call).
    pub budget: u32,

    /// Stop early when two consecutive attempts fail with the same error
    /// description. Default: `false`.
    pub stop_on_repeat: bool,

    /// Upper bound on a single generator call. `None` leaves it to the
    /// HTTP client's own timeout.
    pub call_timeout: Option<Duration>,

    /// How raw generator text is turned into JSON. Default: [`ParseMode::Strict`].
    pub parse_mode: ParseMode,
}

impl RetryConfig {
    /// Repair up to `budget` times.
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            stop_on_repeat: false,
            call_timeout: None,
            parse_mode: ParseMode::Strict,
        }
    }

    /// A single call, no repairs.
    pub fn no_repair() -> Self {
        Self::new(0)
    }

    /// Fail with `Stagnated` when an error description repeats verbatim.
    pub fn stop_on_repeat(mut self) -> Self {
        self.stop_on_repeat = true;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Accept fenced or prose-wrapped JSON from the model.
    pub fn lenient(mut self) -> Self {
        self.parse_mode = ParseMode::Lenient;
        self
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    /// Upper bound on generator calls per invocation.
    pub fn max_calls(&self) -> u64 {
        u64::from(self.budget) + 1
    }
}

impl Default for RetryConfig {
    /// Five repairs, the bound the loop was first used with.
    fn default() -> Self {
        Self::new(5)
    }
}
