//! Anthropic API client implementation
//!
//! This module implements the LlmClient trait for the Anthropic (Claude) API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::llm::client::{LlmClient, LlmError};
use crate::llm::types::{CompletionRequest, CompletionResponse, Role, StopReason, Usage};

/// Anthropic API base URL
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default environment variable holding the API key
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl AnthropicConfig {
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
    usage: Arc<Mutex<Usage>>,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    ///
    /// Reads the API key from the environment variable named in the config
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        body
    }

    /// Parse the API response into a CompletionResponse
    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        if body.get("content").is_none() {
            return Err(LlmError::InvalidResponse(format!("missing content: {}", body)));
        }

        let stop_reason = match body["stop_reason"].as_str() {
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        let usage = Usage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        if let Ok(mut total) = self.usage.lock() {
            total.add(&usage);
        }

        let mut content = String::new();
        if let Some(blocks) = body["content"].as_array() {
            let texts = blocks
                .iter()
                .filter(|block| block["type"].as_str() == Some("text"))
                .filter_map(|block| block["text"].as_str());
            for text in texts {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(text);
            }
        }

        Ok(CompletionResponse {
            content,
            stop_reason,
            usage,
        })
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(self.config.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Tokens spent by every call this client has made
    pub fn total_usage(&self) -> Usage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        log::debug!("Sending completion request to {}", self.config.model);
        let body = self.build_request(&request);
        let response = self.parse_response(self.send_request(body).await?)?;
        if response.stop_reason == StopReason::MaxTokens {
            log::warn!(
                "Response hit the {} token limit and may be truncated",
                request.max_tokens.unwrap_or(self.config.max_tokens)
            );
        }
        Ok(response)
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}
