//! Look up one indexed chunk by its doc id.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use payslip_shared::{Chunk, Metadata, Result, keys};
use payslip_storage::{Filter, IndexStore, SearchRequest};

/// Candidates fetched for an exact doc id lookup.
const LOOKUP_TOP_K: usize = 5;

/// A stored chunk as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayslipSection {
    pub doc_id: String,
    pub section: String,
    pub content: String,
    pub source: String,
    pub metadata: Metadata,
}

impl From<Chunk> for PayslipSection {
    fn from(chunk: Chunk) -> Self {
        Self {
            doc_id: chunk.meta_string(keys::DOC_ID),
            section: chunk.meta_string(keys::SECTION),
            source: chunk.meta_string(keys::SOURCE),
            content: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// The chunk stored under `doc_id`, if any. The first match wins when the
/// store holds several.
#[instrument(skip(store))]
pub async fn get_chunk<S>(store: &S, doc_id: &str) -> Result<Option<PayslipSection>>
where
    S: IndexStore + ?Sized,
{
    let request = SearchRequest::new("")
        .with_filter(Filter::eq(keys::DOC_ID, doc_id))
        .with_top_k(LOOKUP_TOP_K);
    let mut hits = store.search(&request).await?;

    if hits.is_empty() {
        warn!(doc_id, "no section found");
        return Ok(None);
    }
    if hits.len() > 1 {
        warn!(doc_id, count = hits.len(), "multiple sections share a doc id, returning the first");
    }

    info!(doc_id, "section found");
    Ok(Some(PayslipSection::from(hits.swap_remove(0))))
}
