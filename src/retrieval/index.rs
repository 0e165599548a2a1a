//! In-memory retrieval index with hashed bag-of-words embeddings.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ContextRetriever, RetrievalError};

/// Width of the hashed embedding space
pub const EMBEDDING_DIM: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    text: String,
    embedding: Vec<f32>,
}

/// Caller-owned index of facts gathered during diagnosis.
///
/// Embeddings are deterministic: each token is hashed into one of
/// [`EMBEDDING_DIM`] signed buckets and the vector is L2-normalized, so
/// cosine similarity is a dot product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalIndex {
    entries: Vec<IndexEntry>,
}

impl RetrievalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a text. Exact duplicates and blank text are ignored.
    pub fn add(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.entries.iter().any(|e| e.text == text) {
            return;
        }
        self.entries.push(IndexEntry {
            text: text.to_string(),
            embedding: embed(text),
        });
    }

    /// Best `top_k` entries by cosine similarity; ties keep insertion order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<String> {
        if top_k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let query = embed(query);
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (dot(&query, &e.embedding), e))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, e)| e.text.clone())
            .collect()
    }

    /// Load a previously saved index
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the index as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RetrievalError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

#[async_trait]
impl ContextRetriever for RetrievalIndex {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self.search(query, top_k))
    }

    async fn remember(&mut self, text: &str) -> Result<(), RetrievalError> {
        self.add(text);
        Ok(())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric() && ch != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
}

fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % EMBEDDING_DIM as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
