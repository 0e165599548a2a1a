//! Context retrieval for the diagnostic loop.
//!
//! The loop asks a [`ContextRetriever`] for prior facts relevant to the
//! history so far, and feeds every recorded step back into it. The crate ships
//! [`RetrievalIndex`], an in-memory index the caller creates, lends to one run,
//! and may persist afterwards.

mod index;

use async_trait::async_trait;
use thiserror::Error;

pub use index::{EMBEDDING_DIM, RetrievalIndex};

/// Errors from a retrieval backend
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Index IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Ranked snippet lookup over accumulated diagnostic facts
#[async_trait]
pub trait ContextRetriever: Send {
    /// Up to `top_k` snippets most relevant to `query`, best first. Empty is valid.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError>;

    /// Add a fact for later retrieval
    async fn remember(&mut self, text: &str) -> Result<(), RetrievalError>;
}
