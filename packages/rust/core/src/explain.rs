//! Compare two payslips and have the model explain the differences.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use payslip_generation::augment::render_template;
use payslip_generation::{GenerationRequest, Generator};
use payslip_shared::{PayslipError, PromptsConfig, Result, StructuredPayslip};

use crate::diff::{PayslipComparison, compare};

/// Narrative answer plus the comparison it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainedComparison {
    pub answer: String,
    pub comparison: PayslipComparison,
}

/// Compare `previous` with `current` and ask `generator` to narrate the result.
///
/// The question is sent without retrieval augmentation.
#[instrument(skip_all, fields(question_len = question.len()))]
pub async fn explain_comparison<G>(
    generator: &G,
    prompts: &PromptsConfig,
    previous: &StructuredPayslip,
    current: &StructuredPayslip,
    question: &str,
) -> Result<ExplainedComparison>
where
    G: Generator + ?Sized,
{
    let comparison = compare(previous, current);
    let user = user_message(&prompts.user_compare, previous, current, &comparison, question)?;

    let request = GenerationRequest::new(&prompts.system_compare, user);
    let answer = generator.generate(&request).await?.unwrap_or_default();

    info!(
        field_changes = comparison.field_changes.len(),
        benefit_changes = comparison.benefit_changes.len(),
        "explained comparison"
    );
    Ok(ExplainedComparison { answer, comparison })
}

fn user_message(
    template: &str,
    previous: &StructuredPayslip,
    current: &StructuredPayslip,
    comparison: &PayslipComparison,
    question: &str,
) -> Result<String> {
    let pretty = |value: &Value| {
        serde_json::to_string_pretty(value).map_err(|e| PayslipError::parse(e.to_string()))
    };
    let comparison_json = serde_json::to_value(comparison)
        .map_err(|e| PayslipError::parse(e.to_string()))?;

    let params: BTreeMap<String, String> = [
        ("question", question.to_string()),
        ("previous_month", previous.month_key().unwrap_or_default()),
        ("current_month", current.month_key().unwrap_or_default()),
        (
            "employee_number",
            current.employee_number().unwrap_or_default().to_string(),
        ),
        ("national_id", current.national_id().unwrap_or_default().to_string()),
        ("previous_json", pretty(&json_view(previous))?),
        ("current_json", pretty(&json_view(current))?),
        ("comparison_json", pretty(&comparison_json)?),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Ok(render_template(template, &params))
}

/// Reduced view of a payslip shown to the model: identity, period and the
/// compared amounts. Address and payment details are left out.
pub fn json_view(payslip: &StructuredPayslip) -> Value {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let amount = |v: Option<Decimal>| v.unwrap_or(Decimal::ZERO).to_string();
    let date = |v: Option<chrono::NaiveDate>| v.map(|d| d.to_string()).unwrap_or_default();

    let personal = payslip.personal.as_ref().map_or(json!({}), |p| {
        json!({
            "name": text(&p.name),
            "nationalId": text(&p.national_id),
            "maritalStatus": text(&p.marital_status),
            "dependents": p.dependents.unwrap_or(0),
        })
    });
    let employer = payslip.employer.as_ref().map_or(json!({}), |e| {
        json!({
            "name": text(&e.name),
            "employerNumber": text(&e.employer_number),
        })
    });
    let employment = payslip.employment.as_ref().map_or(json!({}), |e| {
        json!({
            "employeeNumber": text(&e.employee_number),
            "jobTitle": text(&e.job_title),
            "status": text(&e.status),
            "payCategory": text(&e.pay_category),
            "baseMonthlySalary": amount(e.base_monthly_salary),
        })
    });
    let period = payslip.period.as_ref().map_or(json!({}), |p| {
        json!({
            "periodStart": date(p.period_start),
            "periodEnd": date(p.period_end),
            "payDate": date(p.pay_date),
            "currency": text(&p.currency),
        })
    });
    let financial = payslip.financial.as_ref().map_or(json!({}), |f| {
        json!({
            "gross": amount(f.gross),
            "taxable": amount(f.taxable),
            "socialSecurity": amount(f.social_security),
            "withholdingTax": amount(f.withholding_tax),
            "net": amount(f.net),
        })
    });
    let extras = payslip.extras.as_ref().map_or(json!({}), |x| {
        json!({
            "mealVoucherContributionEmployer": amount(x.meal_voucher_contribution_employer),
            "mealVoucherContributionEmployee": amount(x.meal_voucher_contribution_employee),
            "mealVoucherCount": x.meal_voucher_count.unwrap_or(0),
        })
    });

    json!({
        "personal": personal,
        "employer": employer,
        "employment": employment,
        "period": period,
        "financial": financial,
        "extras": extras,
    })
}
