//! Find previously indexed payslips of one person.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use payslip_shared::{Chunk, PayslipError, Result, keys};
use payslip_storage::{Filter, IndexStore, SearchRequest};

use crate::fusion::UNKNOWN_DOC_ID;

/// Fixed query used to rank a person's chunks.
const SEARCH_QUERY: &str = "payslip information";

/// Chunks fetched per requested payslip.
const RESULT_MULTIPLIER: usize = 10;

/// One payslip, reassembled from its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarPayslip {
    /// The `payslip:{id}:{month}:{fileHash}` prefix shared by its chunks.
    pub payslip_id: String,
    pub national_id: String,
    pub name: String,
    pub month_key: String,
    pub pay_date: String,
    pub source: String,
    pub document_ids: Vec<String>,
}

/// Payslips whose chunks match `national_id` and/or `employee_name` (OR when
/// both are given), grouped per payslip in first-seen order, at most `limit`.
#[instrument(skip_all, fields(limit))]
pub async fn find_similar<S>(
    store: &S,
    national_id: Option<&str>,
    employee_name: Option<&str>,
    limit: usize,
) -> Result<Vec<SimilarPayslip>>
where
    S: IndexStore + ?Sized,
{
    let national_id = national_id.filter(|s| !s.trim().is_empty());
    let employee_name = employee_name.filter(|s| !s.trim().is_empty());

    let filter = match (national_id, employee_name) {
        (Some(id), Some(name)) => Filter::eq(keys::PERSONAL_NATIONAL_ID, id)
            .or(Filter::eq(keys::PERSONAL_NAME, name)),
        (Some(id), None) => Filter::eq(keys::PERSONAL_NATIONAL_ID, id),
        (None, Some(name)) => Filter::eq(keys::PERSONAL_NAME, name),
        (None, None) => {
            return Err(PayslipError::invalid_argument(
                "at least one of nationalId or employeeName must be provided",
            ));
        }
    };

    let request = SearchRequest::new(SEARCH_QUERY)
        .with_filter(filter)
        .with_top_k(limit.saturating_mul(RESULT_MULTIPLIER));
    let chunks = store.search(&request).await?;
    info!(found = chunks.len(), "matched chunks");

    Ok(group_by_payslip(&chunks, limit))
}

/// First four colon segments of a doc id; shorter ids are used whole.
pub fn payslip_id(doc_id: &str) -> String {
    let parts: Vec<&str> = doc_id.split(':').collect();
    if parts.len() >= 4 {
        parts[..4].join(":")
    } else {
        doc_id.to_string()
    }
}

fn group_by_payslip(chunks: &[Chunk], limit: usize) -> Vec<SimilarPayslip> {
    let mut groups: Vec<SimilarPayslip> = Vec::new();

    for chunk in chunks {
        let doc_id = chunk.doc_id().unwrap_or(UNKNOWN_DOC_ID);
        let id = payslip_id(doc_id);

        let position = match groups.iter().position(|g| g.payslip_id == id) {
            Some(position) => position,
            None => {
                groups.push(SimilarPayslip {
                    payslip_id: id,
                    national_id: chunk.meta_string(keys::PERSONAL_NATIONAL_ID),
                    name: chunk.meta_string(keys::PERSONAL_NAME),
                    month_key: chunk.meta_string(keys::PERIOD_MONTH_KEY),
                    pay_date: chunk.meta_string(keys::PERIOD_PAY_DATE),
                    source: chunk.meta_string(keys::SOURCE),
                    document_ids: Vec::new(),
                });
                groups.len() - 1
            }
        };
        groups[position].document_ids.push(doc_id.to_string());
    }

    groups.truncate(limit);
    groups
}
