//! Index store for payslip chunks.
//!
//! [`IndexStore`] is the similarity-search seam used by indexing and
//! retrieval. Two implementations share one contract:
//! - [`Storage`]: libSQL database (offline mode), persistent
//! - [`MemoryStore`]: in-process, for tests and one-shot commands
//!
//! Both key chunks by their `docId` metadata (upsert, last write wins) and
//! apply the same [`Filter`] semantics. With an [`Embedder`] attached they
//! rank by embedding cosine ([`similarity::cosine`]); without one they rank
//! with the lexical [`similarity::score`].

mod embedding;
mod filter;
mod memory;
mod migrations;
pub mod similarity;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use payslip_shared::{Chunk, Metadata, PayslipError, Result};
use uuid::Uuid;

pub use embedding::Embedder;
pub use filter::Filter;
pub use memory::MemoryStore;

/// Result count used when a request does not set one.
pub const DEFAULT_TOP_K: usize = 4;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// A similarity search over stored chunks.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query. An empty query scores every candidate 0.
    pub query: String,
    /// Metadata filter applied before ranking.
    pub filter: Option<Filter>,
    /// Maximum number of results.
    pub top_k: usize,
    /// Minimum score (inclusive). `None` accepts every candidate.
    pub threshold: Option<f64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filter: None,
            top_k: DEFAULT_TOP_K,
            threshold: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Write and search access to indexed chunks.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Upsert chunks. Chunks carrying `docId` are keyed by it; others get a
    /// fresh UUID v7. Returns the keys in input order.
    async fn add(&self, chunks: &[Chunk]) -> Result<Vec<String>>;

    /// Filtered chunks ordered by descending score (ties keep insertion
    /// order), at most `top_k`, each scoring at least `threshold`.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Chunk>>;
}

/// Storage key of a chunk.
pub(crate) fn chunk_key(chunk: &Chunk) -> String {
    chunk
        .doc_id()
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string())
}

/// Score one candidate: embedding cosine when both the query and the chunk
/// have a vector, lexical similarity otherwise.
pub(crate) fn score_candidate(
    request: &SearchRequest,
    query_vector: Option<&[f32]>,
    chunk: &Chunk,
    embedding: Option<&[f32]>,
) -> f64 {
    match (query_vector, embedding) {
        (Some(q), Some(e)) => similarity::cosine(q, e),
        _ => similarity::score(&request.query, &chunk.text),
    }
}

/// Threshold, order and truncate scored candidates.
pub(crate) fn rank(scored: Vec<(f64, Chunk)>, request: &SearchRequest) -> Vec<Chunk> {
    let mut scored: Vec<(f64, Chunk)> = scored
        .into_iter()
        .filter(|(score, _)| request.threshold.is_none_or(|t| *score >= t))
        .collect();

    // Stable sort keeps insertion order for equal scores.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(request.top_k)
        .map(|(_, chunk)| chunk)
        .collect()
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Persistent index store wrapping a libSQL database.
///
/// **Access rules:**
/// - indexing commands: read-write via [`Storage::open`]
/// - lookup-only commands: read-only via [`Storage::open_readonly`]
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PayslipError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            embedder: None,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    ///
    /// Migrations are not run, so the schema must already be current.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: true,
            embedder: None,
        };
        let version = storage.get_schema_version().await;
        let latest = migrations::latest_version();
        if version < latest {
            return Err(PayslipError::Storage(format!(
                "index schema v{version} is older than v{latest}; open it read-write to migrate"
            )));
        }
        Ok(storage)
    }

    /// Embed chunks on write and queries on search with `embedder`.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PayslipError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PayslipError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Total number of stored chunks.
    pub async fn count_chunks(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM chunks", params![])
            .await
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| PayslipError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(PayslipError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl IndexStore for Storage {
    async fn add(&self, chunks: &[Chunk]) -> Result<Vec<String>> {
        self.check_writable()?;
        let embeddings = embedding::embed_chunks(self.embedder.as_deref(), chunks).await?;
        let now = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(embeddings) {
            let id = chunk_key(chunk);
            let metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| PayslipError::Storage(format!("encode metadata: {e}")))?;
            let blob = vector.map_or(Value::Null, |v| Value::Blob(embedding::to_blob(&v)));

            self.conn
                .execute(
                    "INSERT INTO chunks (doc_id, section, content, metadata_json, embedding, indexed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(doc_id) DO UPDATE SET
                       section = excluded.section,
                       content = excluded.content,
                       metadata_json = excluded.metadata_json,
                       embedding = excluded.embedding,
                       indexed_at = excluded.indexed_at",
                    vec![
                        Value::Text(id.clone()),
                        Value::Text(chunk.section.clone()),
                        Value::Text(chunk.text.clone()),
                        Value::Text(metadata_json),
                        blob,
                        Value::Text(now.clone()),
                    ],
                )
                .await
                .map_err(|e| PayslipError::Storage(e.to_string()))?;
            ids.push(id);
        }

        tracing::debug!(count = ids.len(), "upserted chunks");
        Ok(ids)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Chunk>> {
        let query_vector = embedding::embed_query(self.embedder.as_deref(), &request.query).await?;

        let mut values = Vec::new();
        let predicate = request
            .filter
            .as_ref()
            .map(|f| f.to_sql(&mut values))
            .unwrap_or_else(|| "1".into());
        let sql = format!(
            "SELECT section, content, metadata_json, embedding FROM chunks \
             WHERE {predicate} ORDER BY rowid"
        );

        let mut rows = self
            .conn
            .query(&sql, values)
            .await
            .map_err(|e| PayslipError::Storage(e.to_string()))?;

        let mut scored = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let (chunk, vector) = row_to_chunk(&row)?;
            let score =
                score_candidate(request, query_vector.as_deref(), &chunk, vector.as_deref());
            scored.push((score, chunk));
        }
        Ok(rank(scored, request))
    }
}

/// Convert a `chunks` row to a [`Chunk`] and its stored embedding.
fn row_to_chunk(row: &libsql::Row) -> Result<(Chunk, Option<Vec<f32>>)> {
    let section: String = row
        .get(0)
        .map_err(|e| PayslipError::Storage(e.to_string()))?;
    let content: String = row
        .get(1)
        .map_err(|e| PayslipError::Storage(e.to_string()))?;
    let metadata_json: String = row
        .get(2)
        .map_err(|e| PayslipError::Storage(e.to_string()))?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| PayslipError::Storage(format!("invalid metadata json: {e}")))?;
    let vector = match row
        .get_value(3)
        .map_err(|e| PayslipError::Storage(e.to_string()))?
    {
        Value::Blob(blob) => Some(embedding::from_blob(&blob)?),
        _ => None,
    };
    Ok((Chunk::new(section, content, metadata), vector))
}
