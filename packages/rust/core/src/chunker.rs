//! Render a structured payslip into ordered, indexable text chunks.
//!
//! One chunk per present section in the fixed order `personal`, `employer`,
//! `employment`, `period`, `financial`, `extras`, followed by one `benefit`
//! chunk per benefit item. Every chunk carries the same base metadata plus
//! its own `section` key.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use payslip_shared::{
    Benefit, Chunk, EmployerInfo, EmploymentInfo, Extras, FinancialInfo, MetaValue, Metadata,
    PeriodInfo, PersonalInfo, StructuredPayslip, format_month_key, keys,
};

use crate::identity::sha256_hex;

/// Addresses longer than this are cut and suffixed with an ellipsis.
const MAX_ADDRESS_DISPLAY_LEN: usize = 80;

// ---------------------------------------------------------------------------
// Chunk building
// ---------------------------------------------------------------------------

/// Build the ordered chunks of one payslip (without doc ids).
pub fn build_chunks(payslip: &StructuredPayslip, source: Option<&str>, bytes: &[u8]) -> Vec<Chunk> {
    let base = base_metadata(payslip, source, bytes);
    let mut chunks = Vec::new();

    let sections = [
        ("personal", payslip.personal.as_ref().map(personal_text)),
        ("employer", payslip.employer.as_ref().map(employer_text)),
        ("employment", payslip.employment.as_ref().map(employment_text)),
        ("period", payslip.period.as_ref().map(period_text)),
        ("financial", payslip.financial.as_ref().map(financial_text)),
        ("extras", payslip.extras.as_ref().map(extras_text)),
    ];
    for (section, text) in sections {
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            chunks.push(section_chunk(section, text, base.clone()));
        }
    }

    for benefit in payslip.benefits() {
        let mut metadata = base.clone();
        put(&mut metadata, "benefit.code", text(&benefit.code));
        put(&mut metadata, "benefit.label", text(&benefit.label));
        put(&mut metadata, "benefit.category", text(&benefit.category));
        put(&mut metadata, "benefit.direction", text(&benefit.direction));
        put(&mut metadata, "benefit.taxable", benefit.taxable == Some(true));
        put(&mut metadata, "benefit.amount", or_zero(benefit.amount));
        chunks.push(section_chunk("benefit", benefit_text(benefit), metadata));
    }

    chunks
}

fn section_chunk(section: &str, text: String, mut metadata: Metadata) -> Chunk {
    put(&mut metadata, keys::SECTION, section);
    Chunk::new(section, text, metadata)
}

// ---------------------------------------------------------------------------
// Section templates
// ---------------------------------------------------------------------------

fn personal_text(p: &PersonalInfo) -> String {
    format!(
        "PERSONAL\n\
         Employee: {}\n\
         National ID: {}\n\
         Marital status: {}\n\
         Dependents: {}\n\
         Address: {}\n",
        text(&p.name),
        text(&p.national_id),
        text(&p.marital_status),
        int_string(p.dependents),
        short_address(text(&p.address)),
    )
}

fn employer_text(e: &EmployerInfo) -> String {
    format!(
        "EMPLOYER\n\
         Name: {}\n\
         Number: {}\n\
         Address: {}\n",
        text(&e.name),
        text(&e.employer_number),
        text(&e.address),
    )
}

fn employment_text(e: &EmploymentInfo) -> String {
    format!(
        "EMPLOYMENT\n\
         Employee number: {}\n\
         Job title: {}\n\
         Status: {}\n\
         Pay category: {}\n\
         Base monthly salary: {}\n",
        text(&e.employee_number),
        text(&e.job_title),
        text(&e.status),
        text(&e.pay_category),
        money_string(e.base_monthly_salary),
    )
}

fn period_text(p: &PeriodInfo) -> String {
    format!(
        "PERIOD\n\
         Start: {}\n\
         End: {}\n\
         Pay date: {}\n\
         Currency: {}\n",
        date_string(p.period_start),
        date_string(p.period_end),
        date_string(p.pay_date),
        text(&p.currency),
    )
}

fn financial_text(f: &FinancialInfo) -> String {
    format!(
        "FINANCIAL\n\
         Gross: {}\n\
         Taxable: {}\n\
         Social security (RSZ): {}\n\
         Withholding tax: {}\n\
         Net: {}\n\
         Payment IBAN (last4): {}\n\
         Payment BIC (last4): {}\n",
        money_string(f.gross),
        money_string(f.taxable),
        money_string(f.social_security),
        money_string(f.withholding_tax),
        money_string(f.net),
        last4(text(&f.payment_iban)),
        last4(text(&f.payment_bic)),
    )
}

fn extras_text(e: &Extras) -> String {
    format!(
        "EXTRAS\n\
         Meal voucher (employer): {}\n\
         Meal voucher (employee): {}\n\
         Meal voucher count: {}\n",
        money_string(e.meal_voucher_contribution_employer),
        money_string(e.meal_voucher_contribution_employee),
        int_string(e.meal_voucher_count),
    )
}

fn benefit_text(b: &Benefit) -> String {
    format!(
        "BENEFIT\n\
         Code: {}\n\
         Label: {}\n\
         Category: {}\n\
         Amount: {}\n\
         Direction: {}\n\
         Taxable: {}\n",
        text(&b.code),
        text(&b.label),
        text(&b.category),
        money_string(b.amount),
        text(&b.direction),
        b.taxable == Some(true),
    )
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Metadata shared by every chunk of one indexing call.
pub fn base_metadata(payslip: &StructuredPayslip, source: Option<&str>, bytes: &[u8]) -> Metadata {
    let mut m = Metadata::new();

    if let Some(source) = source {
        put(&mut m, keys::SOURCE, source);
    }
    if !bytes.is_empty() {
        put(&mut m, keys::FILE_SIZE, bytes.len() as i64);
        put(&mut m, keys::FILE_SHA256, sha256_hex(bytes));
    }

    if let Some(p) = &payslip.personal {
        put(&mut m, keys::PERSONAL_NAME, text(&p.name));
        put(&mut m, keys::PERSONAL_NATIONAL_ID, text(&p.national_id));
        put(&mut m, "personal.maritalStatus", text(&p.marital_status));
        put(&mut m, "personal.address", text(&p.address));
        put(&mut m, "personal.dependents", p.dependents.unwrap_or(0));
    }

    if let Some(e) = &payslip.employer {
        put(&mut m, "employer.name", text(&e.name));
        put(&mut m, keys::EMPLOYER_NUMBER, text(&e.employer_number));
        put(&mut m, "employer.address", text(&e.address));
    }

    if let Some(e) = &payslip.employment {
        put(&mut m, keys::EMPLOYEE_NUMBER, text(&e.employee_number));
        put(&mut m, "employment.jobTitle", text(&e.job_title));
        put(&mut m, "employment.status", text(&e.status));
        put(&mut m, "employment.payCategory", text(&e.pay_category));
        put(&mut m, "employment.baseSalary", or_zero(e.base_monthly_salary));
    }

    if let Some(p) = &payslip.period {
        put(&mut m, "period.start", date_string(p.period_start));
        put(&mut m, "period.end", date_string(p.period_end));
        put(&mut m, keys::PERIOD_PAY_DATE, date_string(p.pay_date));
        put(&mut m, "period.currency", text(&p.currency));
        put(
            &mut m,
            keys::PERIOD_MONTH_KEY,
            p.period_start.map(format_month_key).unwrap_or_default(),
        );
    }

    if let Some(f) = &payslip.financial {
        put(&mut m, "financial.gross", or_zero(f.gross));
        put(&mut m, "financial.taxable", or_zero(f.taxable));
        put(&mut m, "financial.net", or_zero(f.net));
        put(&mut m, "financial.rsz", or_zero(f.social_security));
        put(&mut m, "financial.tax", or_zero(f.withholding_tax));
        put(&mut m, "financial.iban.last4", last4(text(&f.payment_iban)));
        put(&mut m, "financial.bic.last4", last4(text(&f.payment_bic)));
    }

    m
}

fn put(metadata: &mut Metadata, key: &str, value: impl Into<MetaValue>) {
    metadata.insert(key.to_string(), value.into());
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn int_string(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn date_string(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn or_zero(value: Option<Decimal>) -> Decimal {
    value.unwrap_or(Decimal::ZERO)
}

/// Minimal decimal form (`1200.50` → `1200.5`), or `"0"` when absent.
pub fn money_string(value: Option<Decimal>) -> String {
    value
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| "0".into())
}

/// Last four characters after removing whitespace.
pub fn last4(value: &str) -> String {
    let chars: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
    let start = chars.len().saturating_sub(4);
    chars[start..].iter().collect()
}

/// Address cut to 80 characters plus `…` when longer.
pub fn short_address(address: &str) -> String {
    if address.chars().count() > MAX_ADDRESS_DISPLAY_LEN {
        let mut short: String = address.chars().take(MAX_ADDRESS_DISPLAY_LEN).collect();
        short.push('…');
        short
    } else {
        address.to_string()
    }
}
