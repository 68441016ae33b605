//! Content-addressed identifiers for indexed chunks.
//!
//! `baseId = payslip:{primaryIdentifier}:{monthKey}:{shortFileHash}` is shared
//! by every chunk of one indexing call; each chunk then gets
//! `docId = {baseId}:{section}:{shortTextHash}:{index}`.

use payslip_shared::{Chunk, StructuredPayslip};
use sha2::{Digest, Sha256};

/// Length of the hex prefixes used in identifiers.
const SHORT_HASH_LEN: usize = 8;

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First eight hex characters of the SHA-256 of `text`.
pub fn short_text_hash(text: &str) -> String {
    let mut hash = sha256_hex(text.as_bytes());
    hash.truncate(SHORT_HASH_LEN);
    hash
}

/// First eight hex characters of the file hash, or `""` without bytes.
pub fn short_file_hash(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut hash = sha256_hex(bytes);
    hash.truncate(SHORT_HASH_LEN);
    hash
}

/// First non-blank of national id, employee number and source; else `anon`.
pub fn primary_identifier(payslip: &StructuredPayslip, source: Option<&str>) -> String {
    [payslip.national_id(), payslip.employee_number(), source]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .unwrap_or("anon")
        .to_string()
}

/// `YYYY-MM` of the period start, or `unknown`.
pub fn month_key_or_unknown(payslip: &StructuredPayslip) -> String {
    payslip.month_key().unwrap_or_else(|| "unknown".into())
}

/// Identifier prefix shared by every chunk of one indexing call.
pub fn base_id(payslip: &StructuredPayslip, source: Option<&str>, bytes: &[u8]) -> String {
    format!(
        "payslip:{}:{}:{}",
        primary_identifier(payslip, source),
        month_key_or_unknown(payslip),
        short_file_hash(bytes)
    )
}

/// Stamp a `docId` on every chunk, in emission order starting at 0.
pub fn assign_doc_ids(base_id: &str, chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let doc_id = format!(
                "{base_id}:{}:{}:{index}",
                chunk.section,
                short_text_hash(&chunk.text)
            );
            chunk.with_doc_id(doc_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use payslip_shared::{EmploymentInfo, Metadata, PeriodInfo, PersonalInfo};

    fn payslip(national_id: Option<&str>, employee_number: Option<&str>) -> StructuredPayslip {
        StructuredPayslip {
            personal: Some(PersonalInfo {
                national_id: national_id.map(Into::into),
                ..Default::default()
            }),
            employment: Some(EmploymentInfo {
                employee_number: employee_number.map(Into::into),
                ..Default::default()
            }),
            period: Some(PeriodInfo {
                period_start: NaiveDate::from_ymd_opt(2024, 3, 1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(short_text_hash(""), "e3b0c442");
    }

    #[test]
    fn primary_identifier_precedence() {
        assert_eq!(primary_identifier(&payslip(Some("N1"), Some("E1")), Some("f.png")), "N1");
        assert_eq!(primary_identifier(&payslip(Some("  "), Some("E1")), Some("f.png")), "E1");
        assert_eq!(primary_identifier(&payslip(None, Some("")), Some("f.png")), "f.png");
        assert_eq!(primary_identifier(&payslip(None, None), None), "anon");
        assert_eq!(primary_identifier(&StructuredPayslip::default(), Some(" ")), "anon");
    }

    #[test]
    fn base_id_layout() {
        let p = payslip(Some("N1"), None);
        assert_eq!(base_id(&p, None, b""), "payslip:N1:2024-03:");
        assert_eq!(
            base_id(&StructuredPayslip::default(), None, b""),
            "payslip:anon:unknown:"
        );
        let with_file = base_id(&p, None, b"bytes");
        assert_eq!(with_file.len(), "payslip:N1:2024-03:".len() + 8);
    }

    #[test]
    fn doc_ids_carry_section_hash_and_index() {
        let chunks = vec![
            Chunk::new("personal", "PERSONAL\n", Metadata::new()),
            Chunk::new("benefit", "BENEFIT\n", Metadata::new()),
            Chunk::new("benefit", "BENEFIT\n", Metadata::new()),
        ];
        let stamped = assign_doc_ids("payslip:N1:2024-03:", chunks);
        let ids: Vec<_> = stamped.iter().filter_map(Chunk::doc_id).collect();

        let hash = short_text_hash("BENEFIT\n");
        assert_eq!(ids[1], format!("payslip:N1:2024-03::benefit:{hash}:1"));
        assert_eq!(ids[2], format!("payslip:N1:2024-03::benefit:{hash}:2"));
        assert!(ids[0].starts_with("payslip:N1:2024-03::personal:"));
        assert!(ids[0].ends_with(":0"));
    }
}
