//! Text and vision generation for the payslip assistant.
//!
//! Two capability traits sit at the boundary with the language model:
//! - [`Generator`]: answer a question under a system instruction, optionally
//!   augmented with retrieved documents
//! - [`PayslipExtractor`]: turn a page image into a [`StructuredPayslip`]
//!
//! [`OpenRouterClient`] implements both against an OpenAI-compatible API.

pub mod augment;
mod openrouter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use payslip_shared::{Chunk, Result, StructuredPayslip};

pub use openrouter::{ExtractionPrompts, OpenRouterClient};

/// One generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// System instruction. `{name}` placeholders are filled from `params`.
    pub system: String,
    /// Named values substituted into `system`.
    pub params: BTreeMap<String, String>,
    /// The user's question.
    pub question: String,
    /// Retrieved documents used to augment the question. `None` sends the
    /// question as-is; `Some(empty)` tells the model it cannot answer.
    pub documents: Option<Vec<Chunk>>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_documents(mut self, documents: Vec<Chunk>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// System instruction with every param substituted.
    pub fn rendered_system(&self) -> String {
        augment::render_template(&self.system, &self.params)
    }

    /// User message, augmented with documents when retrieval is attached.
    pub fn rendered_user(&self) -> String {
        match &self.documents {
            Some(documents) => augment::augment_query(&self.question, documents),
            None => self.question.clone(),
        }
    }
}

/// Text generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply. `Ok(None)` when the model produced no content.
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>>;
}

/// A raster image of one payslip page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// IANA media type (`image/png`, `image/jpeg`, `image/webp`).
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Vision extraction capability.
#[async_trait]
pub trait PayslipExtractor: Send + Sync {
    async fn extract(&self, image: &PageImage) -> Result<StructuredPayslip>;
}
