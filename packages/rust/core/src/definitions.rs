//! Preload the payroll definition corpus into an index store.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument};

use payslip_shared::{Chunk, MetaValue, Metadata, PayslipError, Result, keys};
use payslip_storage::IndexStore;

use crate::identity::short_text_hash;

/// Section of definition chunks.
const DEFINITION_SECTION: &str = "definition";

/// Index every regular file in `dir` as one definition chunk.
///
/// Returns the number of chunks written. An empty directory writes nothing.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn preload_definitions<S: IndexStore + ?Sized>(store: &S, dir: &Path) -> Result<usize> {
    let entries = fs::read_dir(dir).map_err(|e| PayslipError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PayslipError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    // read_dir order is platform dependent
    files.sort();

    let mut chunks = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = fs::read(path).map_err(|e| PayslipError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(file = %file_name, "loading definition");
        chunks.push(definition_chunk(&file_name, text));
    }

    if chunks.is_empty() {
        info!("no definition files found");
        return Ok(0);
    }

    let ids = store.add(&chunks).await?;
    info!(count = ids.len(), "definitions preloaded");
    Ok(ids.len())
}

/// Build the chunk for one definition file.
pub fn definition_chunk(file_name: &str, text: String) -> Chunk {
    let topic = topic_from_file_name(file_name);
    let doc_id = format!("definition:{topic}:{}", short_text_hash(&text));

    let mut metadata = Metadata::new();
    metadata.insert(keys::TYPE.into(), MetaValue::from(keys::TYPE_DEFINITION));
    metadata.insert(keys::TOPIC.into(), MetaValue::from(topic));
    metadata.insert(keys::SOURCE.into(), MetaValue::from(file_name));
    metadata.insert(keys::SECTION.into(), MetaValue::from(DEFINITION_SECTION));

    Chunk::new(DEFINITION_SECTION, text, metadata).with_doc_id(doc_id)
}

/// File name without its last extension, `_` replaced by `-`, lowercased.
fn topic_from_file_name(file_name: &str) -> String {
    if file_name.is_empty() {
        return "general".into();
    }
    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => stem,
        _ => file_name,
    };
    stem.replace('_', "-").to_lowercase()
}
