//! Multi-source retrieval fusion.
//!
//! Blends the payslip retriever, the definition retriever and the semantic
//! definition matcher into one deduplicated document list, then renders the
//! context block and citation text handed to generation.

use std::collections::HashSet;

use tracing::{debug, instrument};

use payslip_shared::{Chunk, RetrievalConfig, Result};
use payslip_storage::IndexStore;

use crate::retriever::{PayslipIdentifiers, Retriever, VectorRetriever, exclude_seen_sources};

/// Separator between documents in the context block.
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Doc id reported for chunks stored without one.
pub const UNKNOWN_DOC_ID: &str = "unknown";

/// Fused retrieval output.
#[derive(Debug, Clone, Default)]
pub struct FusedRetrieval {
    /// Deduplicated documents in first-seen order.
    pub documents: Vec<Chunk>,
    /// Trimmed non-blank texts joined with [`DOCUMENT_SEPARATOR`].
    pub context: String,
    /// Distinct non-empty doc ids joined with `", "`.
    pub citations: String,
}

/// Run the three retrievers concurrently, then fuse their results.
#[instrument(skip_all, fields(month_key = %ids.month_key))]
pub async fn retrieve<S>(
    store: &S,
    ids: &PayslipIdentifiers,
    retrieval: &RetrievalConfig,
    question: &str,
) -> Result<FusedRetrieval>
where
    S: IndexStore + ?Sized,
{
    let payslip = VectorRetriever::payslip(store, ids, retrieval);
    let definitions = VectorRetriever::definitions(store, retrieval);
    let semantic = VectorRetriever::semantic_definitions(store, retrieval);

    let (payslip_hits, definition_hits, semantic_raw) = tokio::try_join!(
        payslip.retrieve(question),
        definitions.retrieve(question),
        semantic.retrieve(question),
    )?;
    let semantic_hits = exclude_seen_sources(semantic_raw, &definition_hits);

    debug!(
        payslip = payslip_hits.len(),
        definitions = definition_hits.len(),
        semantic = semantic_hits.len(),
        "retrieved"
    );

    let documents = fuse(payslip_hits, definition_hits, semantic_hits);
    Ok(FusedRetrieval {
        context: context_block(&documents),
        citations: citations_text(&documents),
        documents,
    })
}

/// Apply the fallback rule, then deduplicate.
///
/// No payslip hits but some semantic hits: the semantic hits alone.
/// Otherwise payslip ++ definitions ++ semantic.
pub fn fuse(payslip: Vec<Chunk>, definitions: Vec<Chunk>, semantic: Vec<Chunk>) -> Vec<Chunk> {
    let combined = if payslip.is_empty() && !semantic.is_empty() {
        semantic
    } else {
        let mut all = payslip;
        all.extend(definitions);
        all.extend(semantic);
        all
    };
    dedup_by_doc_id(combined)
}

/// Keep the first chunk seen for each doc id.
pub fn dedup_by_doc_id(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert(doc_id_or_unknown(c)))
        .collect()
}

/// The chunk's doc id, or [`UNKNOWN_DOC_ID`].
pub fn doc_id_or_unknown(chunk: &Chunk) -> String {
    chunk.doc_id().unwrap_or(UNKNOWN_DOC_ID).to_string()
}

pub fn context_block(documents: &[Chunk]) -> String {
    documents
        .iter()
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

pub fn citations_text(documents: &[Chunk]) -> String {
    let mut seen = HashSet::new();
    documents
        .iter()
        .map(doc_id_or_unknown)
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect::<Vec<_>>()
        .join(", ")
}
