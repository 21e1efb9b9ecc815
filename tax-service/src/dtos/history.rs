//! Calculation history and analytics bodies.

use crate::models::{
    ListCalculationsFilter, RuleTaxSummary, Tax, TaxMethod, TaxRuleApplication, TaxSummary,
    TaxType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCalculationsParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
}

impl From<ListCalculationsParams> for ListCalculationsFilter {
    fn from(params: ListCalculationsParams) -> Self {
        Self {
            from: params.from,
            to: params.to,
            limit: params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRuleApplicationResponse {
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

impl From<TaxRuleApplication> for TaxRuleApplicationResponse {
    fn from(application: TaxRuleApplication) -> Self {
        Self {
            sequence: application.sequence,
            rule_id: application.rule_id,
            rule_code: application.rule_code,
            rule_name: application.rule_name,
            tax_type: application.tax_type,
            is_compound: application.is_compound,
            priority: application.priority,
            rate: application.rate,
            taxable_amount: application.taxable_amount,
            tax_amount: application.tax_amount,
        }
    }
}

/// A recorded calculation with its applied-rule audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRecordResponse {
    pub tax_id: Uuid,
    pub amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
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
    pub calculated_at: DateTime<Utc>,
    pub applications: Vec<TaxRuleApplicationResponse>,
}

impl From<Tax> for TaxRecordResponse {
    fn from(tax: Tax) -> Self {
        Self {
            tax_id: tax.tax_id,
            amount: tax.amount,
            taxable_amount: tax.taxable_amount,
            tax_amount: tax.tax_amount,
            total_amount: tax.total_amount,
            tax_rate: tax.tax_rate,
            tax_type: tax.tax_type,
            method: tax.method,
            currency: tax.currency,
            country: tax.country,
            state: tax.state,
            city: tax.city,
            postal_code: tax.postal_code,
            product_id: tax.product_id,
            customer_id: tax.customer_id,
            calculated_at: tax.calculated_utc,
            applications: tax
                .applications
                .into_iter()
                .map(TaxRuleApplicationResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummaryResponse {
    pub rule_id: Uuid,
    pub rule_code: String,
    pub applications: i64,
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSummaryResponse {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub calculation_count: i64,
    pub total_taxable_amount: Decimal,
    pub total_tax_amount: Decimal,
    pub rules: Vec<RuleSummaryResponse>,
}

impl TaxSummaryResponse {
    pub fn new(
        summary: TaxSummary,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            from,
            to,
            calculation_count: summary.calculation_count,
            total_taxable_amount: summary.total_taxable_amount,
            total_tax_amount: summary.total_tax_amount,
            rules: summary
                .rules
                .into_iter()
                .map(|rule: RuleTaxSummary| RuleSummaryResponse {
                    rule_id: rule.rule_id,
                    rule_code: rule.rule_code,
                    applications: rule.applications,
                    tax_amount: rule.tax_amount,
                })
                .collect(),
        }
    }
}
