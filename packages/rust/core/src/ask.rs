//! Answer a free-text question about one payslip with retrieval-augmented
//! generation.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use payslip_generation::{GenerationRequest, Generator, PayslipExtractor};
use payslip_shared::{AppConfig, Chunk, RetrievalConfig, Result, StructuredPayslip, keys};
use payslip_storage::IndexStore;

use crate::fusion::{self, doc_id_or_unknown};
use crate::ingest::ingest;
use crate::retriever::{CombinedRetriever, PayslipIdentifiers, Retriever, VectorRetriever};
use crate::source::Upload;

/// Characters of chunk text shown in a citation.
const TEXT_PREVIEW_LEN: usize = 120;

/// Name of the system prompt parameter carrying the fused context.
pub const CONTEXT_PARAM: &str = "question_answer_context";

/// Name of the system prompt parameter carrying the citation list.
pub const CITATIONS_PARAM: &str = "citations";

/// Settings for [`answer`].
#[derive(Debug, Clone)]
pub struct AskSettings {
    pub retrieval: RetrievalConfig,
    /// System instruction; may reference `{question_answer_context}` and `{citations}`.
    pub system_prompt: String,
}

impl From<&AppConfig> for AskSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            retrieval: config.retrieval.clone(),
            system_prompt: config.prompts.system_ask.clone(),
        }
    }
}

/// One source backing an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub doc_id: String,
    pub section: String,
    pub source: String,
    pub period_month_key: String,
    pub employer_number: String,
    pub employee_number: String,
    pub national_id: String,
    pub text_preview: String,
    pub url: String,
}

impl Citation {
    fn from_chunk(chunk: &Chunk, section_path_prefix: &str) -> Self {
        let doc_id = doc_id_or_unknown(chunk);
        Self {
            url: format!("{section_path_prefix}{doc_id}"),
            doc_id,
            section: chunk.meta_string(keys::SECTION),
            source: chunk.meta_string(keys::SOURCE),
            period_month_key: chunk.meta_string(keys::PERIOD_MONTH_KEY),
            employer_number: chunk.meta_string(keys::EMPLOYER_NUMBER),
            employee_number: chunk.meta_string(keys::EMPLOYEE_NUMBER),
            national_id: chunk.meta_string(keys::PERSONAL_NATIONAL_ID),
            text_preview: chunk.text.chars().take(TEXT_PREVIEW_LEN).collect(),
        }
    }
}

/// Answer plus the sources it was grounded on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
}

/// Answer `question` about `payslip`.
///
/// The fused context and citation text are passed to the system prompt; the
/// payslip and definition retrievers (concatenated) augment the question.
#[instrument(skip_all, fields(question_len = question.len()))]
pub async fn answer<S, G>(
    store: &S,
    generator: &G,
    settings: &AskSettings,
    payslip: &StructuredPayslip,
    question: &str,
) -> Result<AskResponse>
where
    S: IndexStore + ?Sized,
    G: Generator + ?Sized,
{
    let ids = PayslipIdentifiers::from(payslip);
    let fused = fusion::retrieve(store, &ids, &settings.retrieval, question).await?;

    let augmentation = CombinedRetriever::new(
        VectorRetriever::payslip(store, &ids, &settings.retrieval),
        VectorRetriever::definitions(store, &settings.retrieval),
    )
    .retrieve(question)
    .await?;

    let request = GenerationRequest::new(&settings.system_prompt, question)
        .with_param(CONTEXT_PARAM, &fused.context)
        .with_param(CITATIONS_PARAM, &fused.citations)
        .with_documents(augmentation);

    let answer = generator.generate(&request).await?.unwrap_or_default();

    let mut sources: Vec<Citation> = Vec::with_capacity(fused.documents.len());
    for chunk in &fused.documents {
        let citation = Citation::from_chunk(chunk, &settings.retrieval.section_path_prefix);
        if !sources.contains(&citation) {
            sources.push(citation);
        }
    }

    info!(sources = sources.len(), answered = !answer.is_empty(), "answered question");
    Ok(AskResponse { answer, sources })
}

/// Ingest `upload`, then answer `question` about the extracted payslip.
pub async fn ask_upload<S, C>(
    store: &S,
    client: &C,
    settings: &AskSettings,
    upload: &Upload,
    question: &str,
) -> Result<AskResponse>
where
    S: IndexStore + ?Sized,
    C: Generator + PayslipExtractor + ?Sized,
{
    let payslip = ingest(store, client, upload).await?;
    answer(store, client, settings, &payslip, question).await
}
