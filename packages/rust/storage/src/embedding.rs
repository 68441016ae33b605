//! Dense text embeddings.
//!
//! Stores that hold an [`Embedder`] score candidates by cosine similarity of
//! embedding vectors; stores without one fall back to lexical scoring.
//! Vectors are persisted as little-endian `f32` blobs.

use async_trait::async_trait;
use payslip_shared::{Chunk, PayslipError, Result};

/// Turns texts into embedding vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed the text of every chunk. Without an embedder every slot is `None`.
pub(crate) async fn embed_chunks(
    embedder: Option<&dyn Embedder>,
    chunks: &[Chunk],
) -> Result<Vec<Option<Vec<f32>>>> {
    let Some(embedder) = embedder else {
        return Ok(vec![None; chunks.len()]);
    };
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(PayslipError::Generation(format!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            chunks.len()
        )));
    }
    Ok(vectors.into_iter().map(Some).collect())
}

/// Embed a query. Blank queries and stores without an embedder yield `None`.
pub(crate) async fn embed_query(
    embedder: Option<&dyn Embedder>,
    query: &str,
) -> Result<Option<Vec<f32>>> {
    let Some(embedder) = embedder else {
        return Ok(None);
    };
    if query.trim().is_empty() {
        return Ok(None);
    }

    let mut vectors = embedder.embed(&[query.to_string()]).await?;
    match vectors.pop() {
        Some(vector) if vectors.is_empty() => Ok(Some(vector)),
        _ => Err(PayslipError::Generation(
            "embedder must return exactly one vector for a query".into(),
        )),
    }
}

/// Encode a vector as a little-endian `f32` blob.
pub(crate) fn to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob written by [`to_blob`].
pub(crate) fn from_blob(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(PayslipError::Storage(format!(
            "invalid embedding byte length {}",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use payslip_shared::Metadata;

    struct Fixed(Vec<Vec<f32>>);

    #[async_trait]
    impl Embedder for Fixed {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.25_f32, -1.5, 3.0];
        let blob = to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(from_blob(&blob).unwrap(), v);
        assert!(from_blob(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn blank_query_is_not_embedded() {
        let embedder = Fixed(vec![vec![1.0]]);
        assert!(embed_query(Some(&embedder), "  ").await.unwrap().is_none());
        assert!(embed_query(None, "net pay").await.unwrap().is_none());
        assert_eq!(
            embed_query(Some(&embedder), "net pay").await.unwrap(),
            Some(vec![1.0])
        );
    }

    #[tokio::test]
    async fn vector_count_must_match_chunks() {
        let embedder = Fixed(vec![vec![1.0]]);
        let chunks = vec![
            Chunk::new("a", "one", Metadata::new()),
            Chunk::new("b", "two", Metadata::new()),
        ];
        assert!(embed_chunks(Some(&embedder), &chunks).await.is_err());
        assert_eq!(embed_chunks(None, &chunks).await.unwrap(), vec![None, None]);
    }
}
