//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] plays back a script of [`MockReply`]s in order and records
//! every prompt it receives, so tests can assert on call counts and on the
//! exact repair prompts the loop produced.
//!
//! # Example
//!
//! ```
//! use llm_repair_loop::backend::{MockBackend, MockReply};
//!
//! let mock = MockBackend::scripted(vec![
//!     MockReply::text(r#"{"order_id": 5}"#),
//!     MockReply::text(r#"{"order_id": 12345}"#),
//! ]);
//! assert_eq!(mock.calls(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::RepairError;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with this text.
    Text(String),
    /// Respond with no content.
    Empty,
    /// Fail with an HTTP status.
    Status { status: u16, body: String },
    /// Wait, then respond with this text.
    Delayed { delay: Duration, text: String },
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn status(status: u16) -> Self {
        MockReply::Status {
            status,
            body: format!("mock status {}", status),
        }
    }

    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        MockReply::Delayed {
            delay,
            text: text.into(),
        }
    }
}

/// A test backend that plays back scripted replies in order.
///
/// Cycles back to the beginning when the script is exhausted.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Create a mock that answers with the given texts in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Create a mock from a full script.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockBackend requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::SeqCst) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        let text = match self.next_reply() {
            MockReply::Text(text) => text,
            MockReply::Empty => String::new(),
            MockReply::Status { status, body } => {
                return Err(RepairError::HttpError {
                    status,
                    body,
                    retry_after: None,
                })
            }
            MockReply::Delayed { delay, text } => {
                tokio::time::sleep(delay).await;
                text
            }
        };

        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
