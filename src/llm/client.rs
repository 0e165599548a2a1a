//! Core LLM client trait, error type and a scripted mock

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Prompt in, text out. No system prompt, one user message.
    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::default().with_user_message(prompt);
        let response = self.complete(request).await?;
        Ok(response.content)
    }
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
            LlmError::MissingApiKey { .. } => false,
        }
    }
}

/// One scripted reply for [`MockLlmClient`]
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

/// Scripted LLM client for tests.
///
/// Replies are consumed in order; every prompt is recorded. When the script
/// runs dry the client answers with an error, like an unreachable endpoint.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers with the given texts in order
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_replies(texts.into_iter().map(|t| MockReply::Text(t.into())))
    }

    /// Create a mock from an explicit reply script
    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Append a reply to the script
    pub fn push(&self, reply: MockReply) {
        self.replies.lock().expect("mock replies poisoned").push_back(reply);
    }

    /// Every user prompt seen so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("mock prompts poisoned").clone()
    }

    /// Number of completed calls
    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("mock prompts poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.prompt().to_string();
        self.prompts.lock().expect("mock prompts poisoned").push(prompt);

        let reply = self.replies.lock().expect("mock replies poisoned").pop_front();
        match reply {
            Some(MockReply::Text(content)) => Ok(CompletionResponse {
                content,
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            }),
            Some(MockReply::Fail(message)) => Err(LlmError::ApiError { status: 503, message }),
            None => Err(LlmError::InvalidResponse("mock script exhausted".to_string())),
        }
    }

}

/// How many times, and how patiently, to retry transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based). A rate limit names its
    /// own wait; anything else backs off exponentially. Both are capped.
    pub fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let wait = match err {
            LlmError::RateLimited { retry_after } => *retry_after,
            _ => self.base_delay.saturating_mul(2u32.saturating_pow(attempt)),
        };
        wait.min(self.max_delay)
    }
}

/// Wraps a client and retries errors that [`LlmError::is_retryable`] accepts.
///
/// Whatever still fails after the last retry is returned as is, so callers
/// see the same "model unavailable" they would without the wrapper.
#[derive(Debug)]
pub struct RetryingClient<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: LlmClient> RetryingClient<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: LlmClient> LlmClient for RetryingClient<L> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    let wait = self.policy.delay_for(attempt, &err);
                    log::warn!(
                        "LLM call failed ({}), retry {}/{} in {:?}",
                        err,
                        attempt + 1,
                        self.policy.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
