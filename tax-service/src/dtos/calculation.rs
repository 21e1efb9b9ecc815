//! Calculation request and response bodies.

use crate::config::TaxDefaults;
use crate::engine::{AppliedRule, TaxCalculation, TaxQuery};
use crate::error::TaxError;
use crate::models::{Location, TaxMethod, TaxType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Body shared by calculate, preview and applicable-rule lookups.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaxCalculationRequest {
    pub amount: Decimal,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    #[validate(length(max = 255, message = "productId is too long"))]
    pub product_id: Option<String>,
    #[validate(length(max = 255, message = "customerId is too long"))]
    pub customer_id: Option<String>,
    pub category_ids: Option<Vec<String>>,
    pub customer_groups: Option<Vec<String>>,
    pub method: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TaxCalculationRequest {
    /// Convert into an engine query. `now` fills a missing date.
    pub fn into_query(
        self,
        now: DateTime<Utc>,
        defaults: &TaxDefaults,
    ) -> Result<TaxQuery, TaxError> {
        let method = match non_blank(self.method) {
            Some(method) => method.parse::<TaxMethod>()?,
            None => defaults.default_method,
        };

        Ok(TaxQuery {
            amount: self.amount,
            location: Location {
                country: self.country.trim().to_string(),
                state: non_blank(self.state),
                city: non_blank(self.city),
                postal_code: non_blank(self.postal_code),
            },
            product_id: non_blank(self.product_id),
            customer_id: non_blank(self.customer_id),
            category_ids: self.category_ids,
            customer_groups: self.customer_groups,
            method,
            date: self.date.unwrap_or(now),
            currency: non_blank(self.currency)
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| defaults.default_currency.clone()),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTaxRuleResponse {
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

impl From<AppliedRule> for AppliedTaxRuleResponse {
    fn from(rule: AppliedRule) -> Self {
        Self {
            rule_id: rule.rule_id,
            rule_code: rule.code,
            rule_name: rule.name,
            tax_type: rule.tax_type,
            is_compound: rule.is_compound,
            priority: rule.priority,
            rate: rule.rate,
            taxable_amount: rule.taxable_amount,
            tax_amount: rule.tax_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCalculationResponse {
    /// Set only when the calculation was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<Uuid>,
    pub amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub effective_rate: Decimal,
    pub method: TaxMethod,
    pub currency: String,
    pub location: String,
    pub applied_rules: Vec<AppliedTaxRuleResponse>,
    pub calculated_at: DateTime<Utc>,
}

impl TaxCalculationResponse {
    pub fn new(calculation: TaxCalculation, tax_id: Option<Uuid>) -> Self {
        Self {
            tax_id,
            amount: calculation.amount,
            taxable_amount: calculation.taxable_amount,
            tax_amount: calculation.tax_amount,
            total_amount: calculation.total_amount,
            effective_rate: calculation.effective_rate,
            method: calculation.method,
            currency: calculation.currency,
            location: calculation.location.display(),
            applied_rules: calculation
                .applied_rules
                .into_iter()
                .map(AppliedTaxRuleResponse::from)
                .collect(),
            calculated_at: calculation.calculated_at,
        }
    }
}
