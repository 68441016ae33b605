//! Prompt templating and retrieval augmentation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use payslip_shared::Chunk;

/// Replaces the user query when retrieval came back empty.
pub const EMPTY_CONTEXT_PROMPT: &str = "The user query is outside the available payslip \
information. Politely tell the user that you cannot answer it.";

/// Substitute every `{name}` placeholder whose name is in `params`.
///
/// Single pass over the template: substituted values are never scanned
/// again, so a value containing `{other}` stays literal. Unknown
/// placeholders are left untouched.
pub fn render_template(template: &str, params: &BTreeMap<String, String>) -> String {
    static PLACEHOLDER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Wrap `question` with the retrieved documents.
///
/// Empty context is not allowed: without documents the model is told to
/// decline rather than answer from prior knowledge.
pub fn augment_query(question: &str, documents: &[Chunk]) -> String {
    if documents.is_empty() {
        return EMPTY_CONTEXT_PROMPT.to_string();
    }

    let context = documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Context information is below.\n\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\n\
         Given the context information and no prior knowledge, answer the query.\n\n\
         Follow these rules:\n\
         1. If the answer is not in the context, say that you don't know.\n\
         2. Avoid statements like \"Based on the context...\".\n\n\
         Query: {question}\n\n\
         Answer:\n"
    )
}
