//! In-process index store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use payslip_shared::{Chunk, PayslipError, Result};

use crate::embedding::{self, Embedder};
use crate::{IndexStore, SearchRequest, chunk_key, rank, score_candidate};

struct Entry {
    id: String,
    chunk: Chunk,
    embedding: Option<Vec<f32>>,
}

/// [`IndexStore`] kept entirely in memory, in insertion order.
///
/// Used by tests and by one-shot CLI commands that do not need persistence.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<Entry>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl MemoryStore {
    /// Store ranking with lexical similarity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store ranking with embeddings from `embedder`.
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: Mutex::default(),
            embedder: Some(embedder),
        }
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<Vec<String>> {
        let embeddings = embedding::embed_chunks(self.embedder.as_deref(), chunks).await?;

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PayslipError::Storage("memory store lock poisoned".into()))?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = chunk_key(chunk);
            let entry = Entry {
                id: id.clone(),
                chunk: chunk.clone(),
                embedding,
            };
            match entries.iter_mut().find(|existing| existing.id == id) {
                Some(slot) => *slot = entry,
                None => entries.push(entry),
            }
            ids.push(id);
        }
        Ok(ids)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Chunk>> {
        let query_vector = embedding::embed_query(self.embedder.as_deref(), &request.query).await?;

        let scored: Vec<(f64, Chunk)> = {
            let entries = self
                .entries
                .lock()
                .map_err(|_| PayslipError::Storage("memory store lock poisoned".into()))?;
            entries
                .iter()
                .filter(|entry| {
                    request
                        .filter
                        .as_ref()
                        .is_none_or(|f| f.matches(&entry.chunk.metadata))
                })
                .map(|entry| {
                    let score = score_candidate(
                        request,
                        query_vector.as_deref(),
                        &entry.chunk,
                        entry.embedding.as_deref(),
                    );
                    (score, entry.chunk.clone())
                })
                .collect()
        };
        Ok(rank(scored, request))
    }
}
