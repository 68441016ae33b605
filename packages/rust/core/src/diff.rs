//! Field and benefit differences between two payslips.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use payslip_shared::{Benefit, StructuredPayslip};

use crate::identity::month_key_or_unknown;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A compared numeric field whose values differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field_name: String,
    pub description: String,
    pub previous_value: Decimal,
    pub current_value: Decimal,
    /// `current_value - previous_value`.
    pub delta: Decimal,
}

/// How a benefit line changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
    /// Present on both sides with at least one flag set.
    Modified {
        amount: bool,
        direction: bool,
        taxable: bool,
    },
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("ADDED"),
            Self::Removed => f.write_str("REMOVED"),
            Self::Modified {
                amount,
                direction,
                taxable,
            } => {
                let parts: Vec<&str> = [
                    (*amount, "AMOUNT_CHANGED"),
                    (*direction, "DIRECTION_CHANGED"),
                    (*taxable, "TAXABLE_CHANGED"),
                ]
                .into_iter()
                .filter_map(|(set, name)| set.then_some(name))
                .collect();
                f.write_str(&parts.join("+"))
            }
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => return Ok(Self::Added),
            "REMOVED" => return Ok(Self::Removed),
            _ => {}
        }
        let (mut amount, mut direction, mut taxable) = (false, false, false);
        for part in s.split('+') {
            match part {
                "AMOUNT_CHANGED" => amount = true,
                "DIRECTION_CHANGED" => direction = true,
                "TAXABLE_CHANGED" => taxable = true,
                other => return Err(format!("unknown change type: {other}")),
            }
        }
        Ok(Self::Modified {
            amount,
            direction,
            taxable,
        })
    }
}

impl Serialize for ChangeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChangeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A benefit line that was added, removed or modified.
///
/// Code, label and category come from the current side when it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitChange {
    pub code: Option<String>,
    pub label: Option<String>,
    pub category: Option<String>,
    pub change_type: ChangeType,
    pub previous_amount: Option<Decimal>,
    pub current_amount: Option<Decimal>,
    pub previous_direction: Option<String>,
    pub current_direction: Option<String>,
    pub previous_taxable: Option<bool>,
    pub current_taxable: Option<bool>,
}

/// Differences between two payslips, headed by the current one's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayslipComparison {
    pub employee_number: String,
    pub national_id: String,
    pub employer_number: String,
    pub previous_month_key: String,
    pub current_month_key: String,
    pub field_changes: Vec<FieldChange>,
    pub benefit_changes: Vec<BenefitChange>,
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Compare `previous` with `current`.
pub fn compare(previous: &StructuredPayslip, current: &StructuredPayslip) -> PayslipComparison {
    let field_changes = COMPARED_FIELDS
        .iter()
        .filter_map(|(name, description, get)| {
            let prev = get(previous).unwrap_or(Decimal::ZERO);
            let curr = get(current).unwrap_or(Decimal::ZERO);
            (prev != curr).then(|| FieldChange {
                field_name: (*name).to_string(),
                description: (*description).to_string(),
                previous_value: prev,
                current_value: curr,
                delta: curr - prev,
            })
        })
        .collect();

    PayslipComparison {
        employee_number: current.employee_number().unwrap_or_default().to_string(),
        national_id: current.national_id().unwrap_or_default().to_string(),
        employer_number: current.employer_number().unwrap_or_default().to_string(),
        previous_month_key: month_key_or_unknown(previous),
        current_month_key: month_key_or_unknown(current),
        field_changes,
        benefit_changes: compare_benefits(previous.benefits(), current.benefits()),
    }
}

type FieldGetter = fn(&StructuredPayslip) -> Option<Decimal>;

/// Compared fields, in output order.
const COMPARED_FIELDS: [(&str, &str, FieldGetter); 9] = [
    ("baseMonthlySalary", "Base monthly salary", |p| {
        p.employment.as_ref().and_then(|e| e.base_monthly_salary)
    }),
    ("gross", "Gross pay", |p| p.financial.as_ref().and_then(|f| f.gross)),
    ("taxable", "Taxable pay", |p| {
        p.financial.as_ref().and_then(|f| f.taxable)
    }),
    ("socialSecurity", "Social security (RSZ)", |p| {
        p.financial.as_ref().and_then(|f| f.social_security)
    }),
    ("withholdingTax", "Withholding tax", |p| {
        p.financial.as_ref().and_then(|f| f.withholding_tax)
    }),
    ("net", "Net pay", |p| p.financial.as_ref().and_then(|f| f.net)),
    ("mealVoucherEmployer", "Meal vouchers (employer contribution)", |p| {
        p.extras
            .as_ref()
            .and_then(|e| e.meal_voucher_contribution_employer)
    }),
    ("mealVoucherEmployee", "Meal vouchers (employee contribution)", |p| {
        p.extras
            .as_ref()
            .and_then(|e| e.meal_voucher_contribution_employee)
    }),
    ("mealVoucherCount", "Meal voucher count", |p| {
        p.extras
            .as_ref()
            .and_then(|e| e.meal_voucher_count)
            .map(Decimal::from)
    }),
];

fn compare_benefits(previous: &[Benefit], current: &[Benefit]) -> Vec<BenefitChange> {
    let prev = key_benefits(previous);
    let curr = key_benefits(current);

    let mut changes = Vec::new();
    for (key, p) in &prev {
        match lookup(&curr, key) {
            None => changes.push(BenefitChange {
                code: p.code.clone(),
                label: p.label.clone(),
                category: p.category.clone(),
                change_type: ChangeType::Removed,
                previous_amount: p.amount,
                current_amount: None,
                previous_direction: p.direction.clone(),
                current_direction: None,
                previous_taxable: Some(is_taxable(p)),
                current_taxable: None,
            }),
            Some(c) => {
                let amount = p.amount.unwrap_or(Decimal::ZERO) != c.amount.unwrap_or(Decimal::ZERO);
                let direction = p.direction.as_deref().unwrap_or("")
                    != c.direction.as_deref().unwrap_or("");
                let taxable = is_taxable(p) != is_taxable(c);
                if amount || direction || taxable {
                    changes.push(BenefitChange {
                        code: c.code.clone(),
                        label: c.label.clone(),
                        category: c.category.clone(),
                        change_type: ChangeType::Modified {
                            amount,
                            direction,
                            taxable,
                        },
                        previous_amount: p.amount,
                        current_amount: c.amount,
                        previous_direction: p.direction.clone(),
                        current_direction: c.direction.clone(),
                        previous_taxable: Some(is_taxable(p)),
                        current_taxable: Some(is_taxable(c)),
                    });
                }
            }
        }
    }

    for (key, c) in &curr {
        if lookup(&prev, key).is_none() {
            changes.push(BenefitChange {
                code: c.code.clone(),
                label: c.label.clone(),
                category: c.category.clone(),
                change_type: ChangeType::Added,
                previous_amount: None,
                current_amount: c.amount,
                previous_direction: None,
                current_direction: c.direction.clone(),
                previous_taxable: None,
                current_taxable: Some(is_taxable(c)),
            });
        }
    }

    changes
}

/// Key benefits by code, else label, else a fresh placeholder. A repeated
/// key keeps its first position and takes the last item.
fn key_benefits(benefits: &[Benefit]) -> Vec<(String, &Benefit)> {
    let mut keyed: Vec<(String, &Benefit)> = Vec::with_capacity(benefits.len());
    for benefit in benefits {
        let key = benefit_key(benefit);
        match keyed.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = benefit,
            None => keyed.push((key, benefit)),
        }
    }
    keyed
}

fn benefit_key(benefit: &Benefit) -> String {
    match (&benefit.code, &benefit.label) {
        (Some(code), _) if !code.trim().is_empty() => code.clone(),
        (_, Some(label)) => label.clone(),
        _ => Uuid::now_v7().to_string(),
    }
}

fn lookup<'a>(keyed: &[(String, &'a Benefit)], key: &str) -> Option<&'a Benefit> {
    keyed.iter().find(|(k, _)| k == key).map(|(_, b)| *b)
}

fn is_taxable(benefit: &Benefit) -> bool {
    benefit.taxable == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use payslip_shared::{Extras, FinancialInfo, PeriodInfo};

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn with_net(net: i64) -> StructuredPayslip {
        StructuredPayslip {
            financial: Some(FinancialInfo {
                net: Some(dec(net)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn with_benefits(benefits: Vec<Benefit>) -> StructuredPayslip {
        StructuredPayslip {
            extras: Some(Extras {
                benefits: Some(benefits),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn benefit(code: &str, amount: i64, direction: &str, taxable: bool) -> Benefit {
        Benefit {
            code: Some(code.into()),
            amount: Some(dec(amount)),
            direction: Some(direction.into()),
            taxable: Some(taxable),
            ..Default::default()
        }
    }

    fn fixture(name: &str) -> StructuredPayslip {
        let json = std::fs::read_to_string(format!("../../../fixtures/json/{name}"))
            .expect("read payslip fixture");
        serde_json::from_str(&json).expect("parse payslip fixture")
    }

    #[test]
    fn net_change_yields_one_field_change() {
        let result = compare(&with_net(1000), &with_net(1200));
        assert_eq!(result.field_changes.len(), 1);
        let change = &result.field_changes[0];
        assert_eq!(change.field_name, "net");
        assert_eq!(change.description, "Net pay");
        assert_eq!(change.delta, dec(200));
        assert!(result.benefit_changes.is_empty());
    }

    #[test]
    fn missing_values_compare_as_zero() {
        let result = compare(&StructuredPayslip::default(), &with_net(0));
        assert!(result.field_changes.is_empty());

        let result = compare(&with_net(50), &StructuredPayslip::default());
        assert_eq!(result.field_changes[0].delta, dec(-50));
    }

    #[test]
    fn decimal_comparison_ignores_scale() {
        let mut prev = with_net(0);
        let mut curr = with_net(0);
        prev.financial.as_mut().unwrap().net = Some(Decimal::new(120050, 2));
        curr.financial.as_mut().unwrap().net = Some(Decimal::new(12005, 1));
        assert!(compare(&prev, &curr).field_changes.is_empty());
    }

    #[test]
    fn added_benefit() {
        let curr = with_benefits(vec![Benefit {
            code: Some("MV".into()),
            amount: Some(dec(50)),
            ..Default::default()
        }]);
        let result = compare(&with_benefits(vec![]), &curr);
        assert_eq!(result.benefit_changes.len(), 1);
        let change = &result.benefit_changes[0];
        assert_eq!(change.change_type, ChangeType::Added);
        assert_eq!(change.current_amount, Some(dec(50)));
        assert_eq!(change.previous_amount, None);
        assert_eq!(change.current_taxable, Some(false));
    }

    #[test]
    fn removed_benefit_carries_previous_fields() {
        let prev = with_benefits(vec![benefit("CAR", 150, "credit", true)]);
        let result = compare(&prev, &StructuredPayslip::default());
        let change = &result.benefit_changes[0];
        assert_eq!(change.change_type, ChangeType::Removed);
        assert_eq!(change.code.as_deref(), Some("CAR"));
        assert_eq!(change.previous_amount, Some(dec(150)));
        assert_eq!(change.previous_taxable, Some(true));
        assert_eq!(change.current_amount, None);
    }

    #[test]
    fn combined_change_type() {
        let prev = with_benefits(vec![benefit("MV", 50, "credit", false)]);
        let curr = with_benefits(vec![benefit("MV", 60, "credit", true)]);
        let result = compare(&prev, &curr);
        assert_eq!(result.benefit_changes.len(), 1);
        assert_eq!(
            result.benefit_changes[0].change_type.to_string(),
            "AMOUNT_CHANGED+TAXABLE_CHANGED"
        );
    }

    #[test]
    fn unchanged_benefit_is_silent() {
        let prev = with_benefits(vec![benefit("MV", 50, "credit", false)]);
        assert!(compare(&prev, &prev.clone()).benefit_changes.is_empty());
    }

    #[test]
    fn duplicate_keys_last_wins_first_position() {
        let prev = with_benefits(vec![
            benefit("A", 1, "credit", false),
            benefit("B", 1, "credit", false),
            benefit("A", 2, "credit", false),
        ]);
        let curr = with_benefits(vec![
            benefit("A", 2, "credit", false),
            benefit("B", 3, "credit", false),
        ]);
        let result = compare(&prev, &curr);
        let codes: Vec<_> = result
            .benefit_changes
            .iter()
            .filter_map(|c| c.code.as_deref())
            .collect();
        assert_eq!(codes, ["B"]);
    }

    #[test]
    fn label_keys_blank_codes() {
        let mut prev = benefit(" ", 10, "debit", false);
        prev.label = Some("Bike allowance".into());
        let mut curr = prev.clone();
        curr.code = None;
        curr.amount = Some(dec(12));

        let result = compare(&with_benefits(vec![prev]), &with_benefits(vec![curr]));
        assert_eq!(result.benefit_changes.len(), 1);
        assert_eq!(
            result.benefit_changes[0].change_type,
            ChangeType::Modified {
                amount: true,
                direction: false,
                taxable: false
            }
        );
    }

    #[test]
    fn unidentified_benefits_surface_as_removed_and_added() {
        let anonymous = Benefit {
            amount: Some(dec(5)),
            ..Default::default()
        };
        let result = compare(
            &with_benefits(vec![anonymous.clone()]),
            &with_benefits(vec![anonymous]),
        );
        let kinds: Vec<_> = result.benefit_changes.iter().map(|c| c.change_type).collect();
        assert_eq!(kinds, [ChangeType::Removed, ChangeType::Added]);
    }

    #[test]
    fn header_comes_from_current_and_month_keys_default_to_unknown() {
        let mut curr = fixture("payslip-2024-02.json");
        curr.period = Some(PeriodInfo {
            period_start: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..Default::default()
        });
        let result = compare(&StructuredPayslip::default(), &curr);
        assert_eq!(result.employee_number, "E-1042");
        assert_eq!(result.national_id, "85.07.30-123.45");
        assert_eq!(result.employer_number, "0123.456.789");
        assert_eq!(result.previous_month_key, "unknown");
        assert_eq!(result.current_month_key, "2024-02");
    }

    #[test]
    fn fixture_months_compare() {
        let result = compare(&fixture("payslip-2024-01.json"), &fixture("payslip-2024-02.json"));
        let fields: Vec<_> = result
            .field_changes
            .iter()
            .map(|c| c.field_name.as_str())
            .collect();
        assert_eq!(
            fields,
            ["gross", "taxable", "socialSecurity", "withholdingTax", "net", "mealVoucherCount"]
        );
        let net = &result.field_changes[4];
        assert_eq!(net.delta, Decimal::new(10645, 2));

        let changes: Vec<_> = result
            .benefit_changes
            .iter()
            .map(|c| (c.code.as_deref().unwrap_or(""), c.change_type.to_string()))
            .collect();
        assert_eq!(
            changes,
            [
                ("MV", "AMOUNT_CHANGED".to_string()),
                ("CAR", "REMOVED".to_string()),
                ("BONUS", "ADDED".to_string()),
            ]
        );
    }

    #[test]
    fn change_type_json_roundtrip() {
        let kind = ChangeType::Modified {
            amount: false,
            direction: true,
            taxable: true,
        };
        let json = serde_json::to_string(&kind).expect("serialize");
        assert_eq!(json, "\"DIRECTION_CHANGED+TAXABLE_CHANGED\"");
        let back: ChangeType = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, kind);
    }
}
