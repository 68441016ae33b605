//! Index a structured payslip: build chunks, assign ids, upsert into a store.

use tracing::{info, instrument};

use payslip_shared::{Chunk, Result, StructuredPayslip};
use payslip_storage::IndexStore;

use crate::chunker::build_chunks;
use crate::identity::{assign_doc_ids, base_id};

/// Chunks of one payslip with their doc ids assigned, ready to store.
pub fn prepare_chunks(
    payslip: &StructuredPayslip,
    source: Option<&str>,
    bytes: &[u8],
) -> Vec<Chunk> {
    let base = base_id(payslip, source, bytes);
    assign_doc_ids(&base, build_chunks(payslip, source, bytes))
}

/// Index `payslip` into `store`. Returns the doc ids in emission order.
#[instrument(skip_all, fields(source = source.unwrap_or(""), bytes = bytes.len()))]
pub async fn index<S>(
    store: &S,
    payslip: &StructuredPayslip,
    source: Option<&str>,
    bytes: &[u8],
) -> Result<Vec<String>>
where
    S: IndexStore + ?Sized,
{
    let chunks = prepare_chunks(payslip, source, bytes);
    let doc_ids: Vec<String> = chunks
        .iter()
        .filter_map(Chunk::doc_id)
        .map(str::to_string)
        .collect();

    store.add(&chunks).await?;
    info!(count = doc_ids.len(), "indexed payslip");
    Ok(doc_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use payslip_shared::keys;
    use payslip_storage::{Filter, MemoryStore, SearchRequest};
    use std::collections::HashSet;

    fn fixture(name: &str) -> StructuredPayslip {
        let json = std::fs::read_to_string(format!("../../../fixtures/json/{name}"))
            .expect("read payslip fixture");
        serde_json::from_str(&json).expect("parse payslip fixture")
    }

    #[tokio::test]
    async fn doc_ids_are_pairwise_distinct() {
        let store = MemoryStore::new();
        let ids = index(&store, &fixture("payslip-2024-01.json"), Some("jan.png"), b"bytes")
            .await
            .expect("index");

        assert_eq!(ids.len(), 8);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let store = MemoryStore::new();
        let payslip = fixture("payslip-2024-01.json");
        let first = index(&store, &payslip, Some("jan.png"), b"bytes").await.expect("index");
        let second = index(&store, &payslip, Some("jan.png"), b"bytes").await.expect("index");

        assert_eq!(first, second);
        assert_eq!(store.len(), first.len());
    }

    #[test]
    fn base_id_prefixes_every_doc_id() {
        let payslip = fixture("payslip-2024-01.json");
        let chunks = prepare_chunks(&payslip, None, b"");
        for chunk in &chunks {
            let id = chunk.doc_id().expect("doc id");
            assert!(id.starts_with("payslip:85.07.30-123.45:2024-01::"), "{id}");
        }
    }

    #[test]
    fn editing_one_field_changes_only_that_chunk() {
        let original = fixture("payslip-2024-01.json");
        let mut edited = original.clone();
        if let Some(f) = edited.financial.as_mut() {
            f.net = Some(rust_decimal::Decimal::new(250000, 2));
        }

        let before = prepare_chunks(&original, None, b"");
        let after = prepare_chunks(&edited, None, b"");

        let changed: Vec<_> = before
            .iter()
            .zip(&after)
            .filter(|(a, b)| a.doc_id() != b.doc_id())
            .map(|(a, _)| a.section.clone())
            .collect();
        assert_eq!(changed, ["financial"]);
    }

    #[tokio::test]
    async fn indexed_chunks_are_searchable_by_identity() {
        let store = MemoryStore::new();
        index(&store, &fixture("payslip-2024-01.json"), None, b"")
            .await
            .expect("index january");
        index(&store, &fixture("payslip-2024-02.json"), None, b"")
            .await
            .expect("index february");

        let hits = store
            .search(
                &SearchRequest::new("")
                    .with_filter(Filter::eq(keys::PERIOD_MONTH_KEY, "2024-02"))
                    .with_top_k(100),
            )
            .await
            .expect("search");
        assert_eq!(hits.len(), 8);
        assert!(hits.iter().all(|c| c.meta_string(keys::PERIOD_MONTH_KEY) == "2024-02"));
    }
}
