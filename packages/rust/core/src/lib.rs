//! Domain logic for the payslip assistant.
//!
//! This crate turns structured payslips into indexed chunks and answers
//! questions over them:
//! - indexing: [`chunker`], [`identity`], [`indexer`], [`definitions`]
//! - retrieval: [`retriever`], [`fusion`], [`ask`]
//! - lookups: [`section`], [`similar`]
//! - comparison: [`diff`], [`explain`]
//! - uploads: [`source`], [`ingest`]
//!
//! Every operation takes the [`payslip_storage::IndexStore`] it works on as
//! an explicit argument.

pub mod ask;
pub mod chunker;
pub mod definitions;
pub mod diff;
pub mod explain;
pub mod fusion;
pub mod identity;
pub mod indexer;
pub mod ingest;
pub mod retriever;
pub mod section;
pub mod similar;
pub mod source;

pub use ask::{AskResponse, AskSettings, Citation, answer, ask_upload};
pub use definitions::preload_definitions;
pub use diff::{BenefitChange, ChangeType, FieldChange, PayslipComparison, compare};
pub use explain::{ExplainedComparison, explain_comparison};
pub use indexer::index;
pub use ingest::ingest;
pub use section::{PayslipSection, get_chunk};
pub use similar::{SimilarPayslip, find_similar};
pub use source::{Upload, UploadKind, decode_upload};
