//! Extract a structured payslip from an upload and index it.

use tracing::{error, info, instrument};

use payslip_generation::PayslipExtractor;
use payslip_shared::{Result, StructuredPayslip};
use payslip_storage::IndexStore;

use crate::indexer::index;
use crate::source::Upload;

/// Extract `upload` and index the result under the upload's name.
///
/// Indexing is best-effort: a store failure is logged and the extracted
/// payslip is still returned. Decode and extraction failures propagate.
#[instrument(skip_all, fields(name = %upload.name, kind = %upload.kind))]
pub async fn ingest<S, E>(store: &S, extractor: &E, upload: &Upload) -> Result<StructuredPayslip>
where
    S: IndexStore + ?Sized,
    E: PayslipExtractor + ?Sized,
{
    let image = upload.page_image()?;
    let payslip = extractor.extract(&image).await?;

    match index(store, &payslip, Some(&upload.name), &upload.bytes).await {
        Ok(doc_ids) => info!(chunks = doc_ids.len(), "payslip ingested"),
        Err(e) => error!(error = %e, "indexing failed, returning extraction only"),
    }

    Ok(payslip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use payslip_generation::PageImage;
    use payslip_shared::{Chunk, PayslipError};
    use payslip_storage::{MemoryStore, SearchRequest};

    use crate::source::decode_upload;

    struct FixtureExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PayslipExtractor for FixtureExtractor {
        async fn extract(&self, image: &PageImage) -> Result<StructuredPayslip> {
            assert_eq!(image.media_type, "image/png");
            self.calls.fetch_add(1, Ordering::SeqCst);
            let json = std::fs::read_to_string("../../../fixtures/json/payslip-2024-01.json")
                .expect("read payslip fixture");
            Ok(serde_json::from_str(&json).expect("parse payslip fixture"))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl IndexStore for BrokenStore {
        async fn add(&self, _chunks: &[Chunk]) -> Result<Vec<String>> {
            Err(PayslipError::Storage("database is locked".into()))
        }

        async fn search(&self, _request: &SearchRequest) -> Result<Vec<Chunk>> {
            Ok(Vec::new())
        }
    }

    fn png_upload() -> Upload {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(b"page");
        decode_upload("jan.png", Some("image/png"), bytes).expect("decode")
    }

    fn extractor() -> FixtureExtractor {
        FixtureExtractor {
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn ingest_extracts_and_indexes() {
        let store = MemoryStore::new();
        let payslip = ingest(&store, &extractor(), &png_upload())
            .await
            .expect("ingest");
        assert_eq!(payslip.national_id(), Some("85.07.30-123.45"));
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn indexing_failure_still_returns_payslip() {
        let payslip = ingest(&BrokenStore, &extractor(), &png_upload())
            .await
            .expect("ingest survives storage failure");
        assert_eq!(payslip.month_key().as_deref(), Some("2024-01"));
    }

    #[tokio::test]
    async fn pdf_fails_before_extraction() {
        let upload = decode_upload("jan.pdf", None, b"%PDF-1.4".to_vec()).expect("decode");
        let extractor = extractor();
        let err = ingest(&MemoryStore::new(), &extractor, &upload)
            .await
            .unwrap_err();
        assert!(matches!(err, PayslipError::Decode { .. }));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }
}
