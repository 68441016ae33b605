//! Application configuration for the payslip assistant.
//!
//! User config lives at `~/.payslip-rag/payslip-rag.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PayslipError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "payslip-rag.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".payslip-rag";

// ---------------------------------------------------------------------------
// Config structs (matching payslip-rag.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Index store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Retrieval thresholds and result sizes.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt templates.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Definition corpus.
    #[serde(default)]
    pub definitions: DefinitionsConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the libSQL index database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.payslip-rag/index.db".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for question answering and comparison narratives.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Vision-capable model used for payslip extraction.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Model used to embed chunks and queries for similarity search.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_chat_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_vision_model() -> String {
    "openai/gpt-4o".into()
}
fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum similarity for chunks of the active payslip.
    #[serde(default = "default_payslip_threshold")]
    pub payslip_threshold: f64,

    /// Maximum chunks of the active payslip.
    #[serde(default = "default_payslip_top_k")]
    pub payslip_top_k: usize,

    /// Minimum similarity for the definition retriever.
    #[serde(default = "default_definition_threshold")]
    pub definition_threshold: f64,

    /// Maximum chunks from the definition retriever.
    #[serde(default = "default_definition_top_k")]
    pub definition_top_k: usize,

    /// Minimum similarity for the semantic definition matcher.
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,

    /// Maximum chunks from the semantic definition matcher.
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Prefix of the lookup path attached to every citation.
    #[serde(default = "default_section_path_prefix")]
    pub section_path_prefix: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            payslip_threshold: default_payslip_threshold(),
            payslip_top_k: default_payslip_top_k(),
            definition_threshold: default_definition_threshold(),
            definition_top_k: default_definition_top_k(),
            semantic_threshold: default_semantic_threshold(),
            semantic_top_k: default_semantic_top_k(),
            section_path_prefix: default_section_path_prefix(),
        }
    }
}

fn default_payslip_threshold() -> f64 {
    0.55
}
fn default_payslip_top_k() -> usize {
    6
}
fn default_definition_threshold() -> f64 {
    0.50
}
fn default_definition_top_k() -> usize {
    4
}
fn default_semantic_threshold() -> f64 {
    0.55
}
fn default_semantic_top_k() -> usize {
    3
}
fn default_section_path_prefix() -> String {
    "/api/payslip/section/".into()
}

/// `[prompts]` section.
///
/// `system_ask` may reference `{question_answer_context}` and `{citations}`.
/// `user_compare` is filled with `{question}`, `{previous_month}`,
/// `{current_month}`, `{employee_number}`, `{national_id}`, `{previous_json}`,
/// `{current_json}` and `{comparison_json}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_system_ask")]
    pub system_ask: String,

    #[serde(default = "default_system_compare")]
    pub system_compare: String,

    #[serde(default = "default_user_compare")]
    pub user_compare: String,

    #[serde(default = "default_system_extraction")]
    pub system_extraction: String,

    #[serde(default = "default_user_extraction")]
    pub user_extraction: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_ask: default_system_ask(),
            system_compare: default_system_compare(),
            user_compare: default_user_compare(),
            system_extraction: default_system_extraction(),
            user_extraction: default_user_extraction(),
        }
    }
}

fn default_system_ask() -> String {
    "You answer questions about a single payslip. Use only the context below. \
     When the context does not contain the answer, say so. \
     Cite the document ids you relied on.\n\n\
     Context:\n{question_answer_context}\n\nDocument ids: {citations}"
        .into()
}
fn default_system_compare() -> String {
    "You explain differences between two payslips of the same employee. \
     Rely on the computed comparison; do not recompute amounts."
        .into()
}
fn default_user_compare() -> String {
    "Question: {question}\n\
     Previous month: {previous_month}\n\
     Current month: {current_month}\n\
     Employee number: {employee_number}\n\
     National ID: {national_id}\n\n\
     Previous payslip:\n{previous_json}\n\n\
     Current payslip:\n{current_json}\n\n\
     Computed comparison:\n{comparison_json}"
        .into()
}
fn default_system_extraction() -> String {
    "You extract structured data from Belgian payslip images. \
     Reply with a single JSON object and nothing else."
        .into()
}
fn default_user_extraction() -> String {
    "Extract this payslip as JSON with the optional objects personal \
     (name, address, nationalId, maritalStatus, dependents), employer \
     (name, address, employerNumber), employment (employeeNumber, jobTitle, \
     status, payCategory, baseMonthlySalary), period (periodStart, periodEnd, \
     payDate as YYYY-MM-DD, currency), financial (gross, taxable, \
     socialSecurity, withholdingTax, net, paymentIban, paymentBic) and extras \
     (mealVoucherContributionEmployer, mealVoucherContributionEmployee, \
     mealVoucherCount, benefits: [{code, label, category, amount, direction, \
     taxable}]). Use null for anything not printed on the payslip."
        .into()
}

/// `[definitions]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    /// Directory whose files form the definition corpus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.payslip-rag/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PayslipError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.payslip-rag/payslip-rag.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PayslipError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PayslipError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PayslipError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PayslipError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PayslipError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PayslipError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PayslipError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn retrieval_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.payslip_threshold, 0.55);
        assert_eq!(config.retrieval.payslip_top_k, 6);
        assert_eq!(config.retrieval.definition_threshold, 0.50);
        assert_eq!(config.retrieval.definition_top_k, 4);
        assert_eq!(config.retrieval.semantic_threshold, 0.55);
        assert_eq!(config.retrieval.semantic_top_k, 3);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let toml_str = r#"
[retrieval]
payslip_top_k = 10

[definitions]
dir = "/srv/payslip/definitions"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.retrieval.payslip_top_k, 10);
        assert_eq!(config.retrieval.definition_top_k, 4);
        assert_eq!(config.definitions.dir.as_deref(), Some("/srv/payslip/definitions"));
        assert_eq!(config.openrouter.timeout_secs, 60);
    }

    #[test]
    fn default_ask_prompt_has_placeholders() {
        let prompts = PromptsConfig::default();
        assert!(prompts.system_ask.contains("{question_answer_context}"));
        assert!(prompts.system_ask.contains("{citations}"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        let path = expand_home("/tmp/index.db").expect("expand");
        assert_eq!(path, PathBuf::from("/tmp/index.db"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "PAYSLIP_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
