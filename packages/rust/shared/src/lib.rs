//! Shared types, error model, and configuration for the payslip assistant.
//!
//! This crate is the foundation depended on by all other payslip crates.
//! It provides:
//! - [`PayslipError`], the unified error type
//! - Domain types ([`StructuredPayslip`], [`Chunk`], [`MetaValue`])
//! - Configuration ([`AppConfig`], [`RetrievalConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefinitionsConfig, OpenRouterConfig, PromptsConfig, RetrievalConfig, StoreConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{PayslipError, Result};
pub use types::{
    Benefit, Chunk, EmployerInfo, EmploymentInfo, Extras, FinancialInfo, MetaValue, Metadata,
    PeriodInfo, PersonalInfo, StructuredPayslip, format_month_key, keys,
};
