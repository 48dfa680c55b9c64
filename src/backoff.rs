//! Caller-side re-invocation with exponential backoff and jitter.
//!
//! The repair loop treats every transport failure as fatal for the current
//! invocation. Whether the *whole loop* should run again is the caller's
//! call. [`BackoffConfig`] captures that policy and
//! [`RetryController::run_with_backoff`](crate::RetryController::run_with_backoff)
//! applies it: a terminal [`FailureReason::Transport`](crate::FailureReason)
//! with a retryable error starts a fresh loop (fresh prompt, fresh budget)
//! after a delay.

use crate::error::RepairError;
use std::time::Duration;

/// Policy for re-running a loop that ended in a transport failure.
///
/// # Example
///
/// ```
/// use llm_repair_loop::backoff::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_reruns, 0);
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_reruns, 3);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of extra loop invocations. Default: 0.
    pub max_reruns: u32,

    /// Delay before the first re-run.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each re-run.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes worth another try. Default: `[429, 500, 502, 503, 504]`.
    pub retryable_statuses: Vec<u16>,

    /// Use the provider's `Retry-After` hint when present.
    pub respect_retry_after: bool,
}

/// Jitter strategy to spread out concurrent callers hitting a shared rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,
    /// Random value in `[0, calculated_delay]`.
    Full,
    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// Never re-run.
    pub fn none() -> Self {
        Self {
            max_reruns: 0,
            ..Self::standard()
        }
    }

    /// 3 re-runs, 1s initial, 2x multiplier, 60s max, full jitter.
    pub fn standard() -> Self {
        Self {
            max_reruns: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// For a user waiting on the answer: 2 re-runs, 500ms initial, 10s max.
    pub fn interactive() -> Self {
        Self {
            max_reruns: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            ..Self::standard()
        }
    }

    /// Whether a transport error should trigger a re-run.
    ///
    /// Connection errors and timeouts always qualify; HTTP errors only when
    /// their status is listed in `retryable_statuses`.
    pub fn is_retryable(&self, error: &RepairError) -> bool {
        match error {
            RepairError::HttpError { status, .. } => self.retryable_statuses.contains(status),
            RepairError::Request(_) | RepairError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Delay before re-run `n` (0-indexed), honouring `Retry-After` when allowed.
    pub fn delay_for(&self, rerun: u32, error: &RepairError) -> Duration {
        if self.respect_retry_after {
            if let RepairError::HttpError {
                retry_after: Some(ra),
                ..
            } = error
            {
                return (*ra).min(self.max_delay);
            }
        }
        self.delay_for_attempt(rerun)
    }

    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}
