//! Recorded tax calculations and their audit trail.

use super::{TaxMethod, TaxType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of one committed calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tax {
    pub tax_id: Uuid,
    pub tenant_id: Uuid,
    pub amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    /// Effective rate as a percentage of the taxable amount.
    pub tax_rate: Decimal,
    pub tax_type: TaxType,
    pub method: TaxMethod,
    pub currency: String,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
    pub calculated_utc: DateTime<Utc>,
    /// Contributing rules in the order they were applied.
    pub applications: Vec<TaxRuleApplication>,
}

/// How one rule contributed to one calculation.
///
/// References the rule by id only; code and name are copied so later rule
/// edits do not rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRuleApplication {
    pub application_id: Uuid,
    pub tax_id: Uuid,
    pub sequence: i32,
    pub rule_id: Uuid,
    pub rule_code: String,
    pub rule_name: String,
    pub tax_type: TaxType,
    pub is_compound: bool,
    pub priority: i32,
    pub rate: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
}

/// Filter parameters for listing calculations.
#[derive(Debug, Clone, Default)]
pub struct ListCalculationsFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i32,
}

/// Aggregate over recorded calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub calculation_count: i64,
    pub total_taxable_amount: Decimal,
    pub total_tax_amount: Decimal,
    pub rules: Vec<RuleTaxSummary>,
}

/// Per-rule totals within a summary, ordered by tax collected (descending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTaxSummary {
    pub rule_id: Uuid,
    pub rule_code: String,
    pub applications: i64,
    pub tax_amount: Decimal,
}
