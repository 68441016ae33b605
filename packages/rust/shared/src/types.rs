//! Core domain types: the structured payslip record and indexable chunks.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well-known metadata keys shared by the indexer, the stores and retrieval.
pub mod keys {
    pub const DOC_ID: &str = "docId";
    pub const SECTION: &str = "section";
    pub const SOURCE: &str = "source";
    pub const TYPE: &str = "type";
    pub const TOPIC: &str = "topic";
    pub const FILE_SIZE: &str = "file.size";
    pub const FILE_SHA256: &str = "file.sha256";
    pub const PERSONAL_NAME: &str = "personal.name";
    pub const PERSONAL_NATIONAL_ID: &str = "personal.nationalId";
    pub const EMPLOYER_NUMBER: &str = "employer.number";
    pub const EMPLOYEE_NUMBER: &str = "employment.employeeNumber";
    pub const PERIOD_MONTH_KEY: &str = "period.monthKey";
    pub const PERIOD_PAY_DATE: &str = "period.payDate";

    /// Value of [`TYPE`] carried by definition-corpus chunks.
    pub const TYPE_DEFINITION: &str = "definition";
}

// ---------------------------------------------------------------------------
// StructuredPayslip
// ---------------------------------------------------------------------------

/// Normalized record produced by upstream extraction.
///
/// A fixed-shape tree of optional sub-records. Every sub-record and every
/// scalar inside it may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredPayslip {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal: Option<PersonalInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer: Option<EmployerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment: Option<EmploymentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial: Option<FinancialInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub dependents: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub employer_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmploymentInfo {
    #[serde(default)]
    pub employee_number: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pay_category: Option<String>,
    #[serde(default)]
    pub base_monthly_salary: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub pay_date: Option<NaiveDate>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialInfo {
    #[serde(default)]
    pub gross: Option<Decimal>,
    #[serde(default)]
    pub taxable: Option<Decimal>,
    #[serde(default)]
    pub social_security: Option<Decimal>,
    #[serde(default)]
    pub withholding_tax: Option<Decimal>,
    #[serde(default)]
    pub net: Option<Decimal>,
    #[serde(default)]
    pub payment_iban: Option<String>,
    #[serde(default)]
    pub payment_bic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extras {
    #[serde(default)]
    pub meal_voucher_contribution_employer: Option<Decimal>,
    #[serde(default)]
    pub meal_voucher_contribution_employee: Option<Decimal>,
    #[serde(default)]
    pub meal_voucher_count: Option<i64>,
    #[serde(default)]
    pub benefits: Option<Vec<Benefit>>,
}

/// One benefit or deduction line of the extras block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Benefit {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub taxable: Option<bool>,
}

impl StructuredPayslip {
    /// `"YYYY-MM"` of the period start, if known.
    pub fn month_key(&self) -> Option<String> {
        self.period
            .as_ref()
            .and_then(|p| p.period_start)
            .map(format_month_key)
    }

    pub fn national_id(&self) -> Option<&str> {
        self.personal.as_ref().and_then(|p| p.national_id.as_deref())
    }

    pub fn employee_number(&self) -> Option<&str> {
        self.employment
            .as_ref()
            .and_then(|e| e.employee_number.as_deref())
    }

    pub fn employer_number(&self) -> Option<&str> {
        self.employer
            .as_ref()
            .and_then(|e| e.employer_number.as_deref())
    }

    /// Benefit list of the extras block; empty when either is absent.
    pub fn benefits(&self) -> &[Benefit] {
        self.extras
            .as_ref()
            .and_then(|e| e.benefits.as_deref())
            .unwrap_or(&[])
    }
}

/// Format a date as a `"YYYY-MM"` month key.
pub fn format_month_key(date: NaiveDate) -> String {
    format!("{}-{:02}", date.year(), date.month())
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A single flat metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
}

/// Flat metadata keyed by dot-paths (`personal.nationalId`, `benefit.amount`).
pub type Metadata = BTreeMap<String, MetaValue>;

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{}", d.normalize()),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Decimal> for MetaValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Tag of the one-entry object a decimal is encoded as.
const DECIMAL_TAG: &str = "decimal";

// Decimals are written as `{"decimal": "<exact digits>"}` so they never pass
// through a binary float and stay distinct from integers and strings.
impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Decimal(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(DECIMAL_TAG, &d.to_string())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for MetaValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MetaValueVisitor;

        impl<'de> Visitor<'de> for MetaValueVisitor {
            type Value = MetaValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number, boolean or {\"decimal\": \"...\"}")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<MetaValue, E> {
                Ok(MetaValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MetaValue, E> {
                Ok(MetaValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MetaValue, E> {
                i64::try_from(v)
                    .map(MetaValue::Int)
                    .map_err(|_| E::custom(format!("integer {v} out of range")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<MetaValue, E> {
                // Shortest round-trip representation, then exact parse.
                v.to_string()
                    .parse::<Decimal>()
                    .map(MetaValue::Decimal)
                    .map_err(|e| E::custom(format!("invalid decimal {v}: {e}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MetaValue, E> {
                Ok(MetaValue::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<MetaValue, E> {
                Ok(MetaValue::Str(v))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<MetaValue, A::Error> {
                let Some((tag, digits)) = map.next_entry::<String, String>()? else {
                    return Err(de::Error::custom("empty object is not a metadata value"));
                };
                if tag != DECIMAL_TAG {
                    return Err(de::Error::unknown_field(&tag, &[DECIMAL_TAG]));
                }
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("decimal object must have a single entry"));
                }
                digits
                    .parse::<Decimal>()
                    .map(MetaValue::Decimal)
                    .map_err(|e| de::Error::custom(format!("invalid decimal {digits}: {e}")))
            }
        }

        deserializer.deserialize_any(MetaValueVisitor)
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One retrievable unit: rendered text plus flat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Section tag (`personal`, `benefit`, `definition`, ...).
    pub section: String,
    /// Rendered text that is embedded/searched and shown to the model.
    pub text: String,
    /// Flat dot-path metadata.
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(section: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            section: section.into(),
            text: text.into(),
            metadata,
        }
    }

    /// The content-addressed identifier, once assigned.
    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get(keys::DOC_ID).and_then(MetaValue::as_str)
    }

    /// Metadata value rendered as a string, or `""` when absent.
    pub fn meta_string(&self, key: &str) -> String {
        self.metadata
            .get(key)
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Return a copy of this chunk carrying `doc_id` in its metadata.
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.metadata
            .insert(keys::DOC_ID.to_string(), MetaValue::Str(doc_id.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payslip_fixture_deserializes() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/payslip-2024-01.json")
            .expect("read fixture");
        let payslip: StructuredPayslip =
            serde_json::from_str(&fixture).expect("deserialize fixture payslip");
        assert_eq!(payslip.national_id(), Some("85.07.30-123.45"));
        assert_eq!(payslip.month_key().as_deref(), Some("2024-01"));
        assert_eq!(payslip.benefits().len(), 2);
    }

    #[test]
    fn missing_sections_deserialize_as_none() {
        let payslip: StructuredPayslip =
            serde_json::from_str(r#"{"financial":{"net":"1200.50"}}"#).expect("parse");
        assert!(payslip.personal.is_none());
        assert!(payslip.benefits().is_empty());
        let net = payslip.financial.and_then(|f| f.net).expect("net");
        assert_eq!(net, "1200.5".parse::<Decimal>().unwrap());
    }

    #[test]
    fn month_key_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(format_month_key(date), "2024-03");
    }

    #[test]
    fn meta_value_json_keeps_kinds() {
        let mut metadata = Metadata::new();
        metadata.insert("a".into(), MetaValue::from("12345"));
        metadata.insert("b".into(), MetaValue::from(3_i64));
        metadata.insert("c".into(), MetaValue::from("1000".parse::<Decimal>().unwrap()));
        metadata.insert("d".into(), MetaValue::from(true));
        metadata.insert("e".into(), MetaValue::from("1200.55".parse::<Decimal>().unwrap()));

        let json = serde_json::to_string(&metadata).expect("serialize");
        let parsed: Metadata = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed["a"], MetaValue::Str("12345".into()));
        assert_eq!(parsed["b"], MetaValue::Int(3));
        assert!(matches!(parsed["c"], MetaValue::Decimal(_)));
        assert_eq!(parsed["d"], MetaValue::Bool(true));
        assert_eq!(parsed["e"].to_string(), "1200.55");
    }

    #[test]
    fn decimals_are_encoded_exactly() {
        let big = "12345678901234567.89".parse::<Decimal>().unwrap();
        let json = serde_json::to_string(&MetaValue::from(big)).expect("serialize");
        assert_eq!(json, r#"{"decimal":"12345678901234567.89"}"#);

        let parsed: MetaValue = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, MetaValue::Decimal(big));

        // Scale survives, `1000.00` is not collapsed into the integer 1000.
        let scaled: MetaValue = serde_json::from_str(r#"{"decimal":"1000.00"}"#).unwrap();
        assert_eq!(scaled, MetaValue::Decimal(Decimal::new(100000, 2)));
    }

    #[test]
    fn unknown_tagged_objects_are_rejected() {
        assert!(serde_json::from_str::<MetaValue>(r#"{"money":"1"}"#).is_err());
        assert!(serde_json::from_str::<MetaValue>(r#"{}"#).is_err());
    }

    #[test]
    fn meta_value_display_strips_trailing_zeros() {
        let value = MetaValue::from("1200.50".parse::<Decimal>().unwrap());
        assert_eq!(value.to_string(), "1200.5");
    }

    #[test]
    fn chunk_doc_id_roundtrip() {
        let chunk = Chunk::new("period", "PERIOD\n", Metadata::new());
        assert!(chunk.doc_id().is_none());
        let chunk = chunk.with_doc_id("payslip:anon:unknown::period:abcd1234:0");
        assert_eq!(chunk.doc_id(), Some("payslip:anon:unknown::period:abcd1234:0"));
        assert_eq!(chunk.meta_string("missing"), "");
    }
}
