//! LLM Client Layer - Anthropic API integration
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction
//! - AnthropicClient implementation
//! - RetryingClient for transient failures
//! - MockLlmClient for scripted tests

pub mod anthropic;
pub mod client;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError, MockLlmClient, MockReply, RetryPolicy, RetryingClient};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};
