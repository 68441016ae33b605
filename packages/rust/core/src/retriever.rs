//! Filtered similarity retrievers over the index store.
//!
//! One [`Retriever`] trait, realised by [`VectorRetriever`] with three
//! configurations: the active payslip, the definition corpus, and the
//! semantic definition matcher.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use payslip_shared::{Chunk, RetrievalConfig, Result, StructuredPayslip, keys};
use payslip_storage::{Filter, IndexStore, SearchRequest};

/// Fetch chunks relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>>;
}

/// Search parameters of one retriever.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub filter: Option<Filter>,
    pub threshold: Option<f64>,
    pub top_k: usize,
}

/// Identifiers selecting the chunks of the payslip being asked about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayslipIdentifiers {
    pub national_id: String,
    pub employee_number: String,
    pub month_key: String,
}

impl From<&StructuredPayslip> for PayslipIdentifiers {
    /// Absent values become `""`.
    fn from(payslip: &StructuredPayslip) -> Self {
        Self {
            national_id: payslip.national_id().unwrap_or_default().to_string(),
            employee_number: payslip.employee_number().unwrap_or_default().to_string(),
            month_key: payslip.month_key().unwrap_or_default(),
        }
    }
}

impl PayslipIdentifiers {
    /// `(nationalId == X OR employeeNumber == Y) AND monthKey == Z`.
    pub fn filter(&self) -> Filter {
        Filter::eq(keys::PERSONAL_NATIONAL_ID, &self.national_id)
            .or(Filter::eq(keys::EMPLOYEE_NUMBER, &self.employee_number))
            .and(Filter::eq(keys::PERIOD_MONTH_KEY, &self.month_key))
    }
}

// ---------------------------------------------------------------------------
// Vector retriever
// ---------------------------------------------------------------------------

/// Retriever backed by [`IndexStore::search`].
pub struct VectorRetriever<'a, S: ?Sized> {
    store: &'a S,
    config: RetrieverConfig,
}

impl<'a, S> VectorRetriever<'a, S>
where
    S: IndexStore + ?Sized,
{
    pub fn new(store: &'a S, config: RetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Chunks of one payslip, selected by its identifiers.
    pub fn payslip(store: &'a S, ids: &PayslipIdentifiers, retrieval: &RetrievalConfig) -> Self {
        Self::new(
            store,
            RetrieverConfig {
                filter: Some(ids.filter()),
                threshold: Some(retrieval.payslip_threshold),
                top_k: retrieval.payslip_top_k,
            },
        )
    }

    /// The definition corpus.
    pub fn definitions(store: &'a S, retrieval: &RetrievalConfig) -> Self {
        Self::new(
            store,
            RetrieverConfig {
                filter: Some(definition_filter()),
                threshold: Some(retrieval.definition_threshold),
                top_k: retrieval.definition_top_k,
            },
        )
    }

    /// The definition corpus under the stricter semantic matcher settings.
    pub fn semantic_definitions(store: &'a S, retrieval: &RetrievalConfig) -> Self {
        Self::new(
            store,
            RetrieverConfig {
                filter: Some(definition_filter()),
                threshold: Some(retrieval.semantic_threshold),
                top_k: retrieval.semantic_top_k,
            },
        )
    }
}

#[async_trait]
impl<'a, S> Retriever for VectorRetriever<'a, S>
where
    S: IndexStore + ?Sized,
{
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let mut request = SearchRequest::new(query).with_top_k(self.config.top_k);
        request.filter = self.config.filter.clone();
        request.threshold = self.config.threshold;
        self.store.search(&request).await
    }
}

fn definition_filter() -> Filter {
    Filter::eq(keys::TYPE, keys::TYPE_DEFINITION)
}

// ---------------------------------------------------------------------------
// Combination helpers
// ---------------------------------------------------------------------------

/// Concatenation of two retrievers' results: no fallback, no dedup.
pub struct CombinedRetriever<A, B> {
    first: A,
    second: B,
}

impl<A, B> CombinedRetriever<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl<A, B> Retriever for CombinedRetriever<A, B>
where
    A: Retriever,
    B: Retriever,
{
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let (mut first, second) =
            tokio::try_join!(self.first.retrieve(query), self.second.retrieve(query))?;
        first.extend(second);
        Ok(first)
    }
}

/// Drop semantic matches whose `source` already appears among `seen`.
/// Empty sources are never considered seen.
pub fn exclude_seen_sources(candidates: Vec<Chunk>, seen: &[Chunk]) -> Vec<Chunk> {
    let seen_sources: HashSet<String> = seen
        .iter()
        .map(|c| c.meta_string(keys::SOURCE))
        .filter(|s| !s.is_empty())
        .collect();

    let total = candidates.len();
    let kept: Vec<Chunk> = candidates
        .into_iter()
        .filter(|c| !seen_sources.contains(&c.meta_string(keys::SOURCE)))
        .collect();

    debug!(
        kept = kept.len(),
        total,
        already_included = seen_sources.len(),
        "semantic definition matches"
    );
    kept
}
