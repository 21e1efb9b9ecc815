//! Tax rule request and response bodies.

use crate::engine::is_country_code;
use crate::error::TaxError;
use crate::models::{
    CreateTaxRule, ListTaxRulesFilter, RuleStatus, RuleType, TaxMethod, TaxRule, TaxType,
    UpdateTaxRule,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[allow(clippy::ptr_arg)]
fn validate_countries(countries: &Vec<String>) -> Result<(), ValidationError> {
    if countries.iter().all(|c| is_country_code(c.trim())) {
        Ok(())
    } else {
        let mut err = ValidationError::new("country_code");
        err.message = Some("countries must be 2-letter codes".into());
        Err(err)
    }
}

fn normalize_countries(countries: Vec<String>) -> Vec<String> {
    countries
        .into_iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaxRuleRequest {
    #[validate(length(min = 1, max = 64, message = "code must be 1-64 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub tax_type: TaxType,
    pub status: Option<RuleStatus>,
    pub rate: Decimal,
    pub method: Option<TaxMethod>,
    #[serde(default)]
    pub is_compound: bool,
    #[serde(default)]
    pub is_inclusive: bool,
    #[serde(default)]
    #[validate(custom(function = "validate_countries"))]
    pub countries: Vec<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub postal_codes: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub customer_ids: Vec<String>,
    #[serde(default)]
    pub customer_groups: Vec<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i32,
}

impl CreateTaxRuleRequest {
    pub fn into_input(self, tenant_id: Uuid) -> CreateTaxRule {
        CreateTaxRule {
            tenant_id,
            code: self.code.trim().to_string(),
            name: self.name,
            description: self.description,
            rule_type: self.rule_type,
            tax_type: self.tax_type,
            status: self.status.unwrap_or(RuleStatus::Active),
            rate: self.rate,
            method: self.method.unwrap_or_default(),
            is_compound: self.is_compound,
            is_inclusive: self.is_inclusive,
            countries: normalize_countries(self.countries),
            states: self.states,
            cities: self.cities,
            postal_codes: self.postal_codes,
            product_ids: self.product_ids,
            category_ids: self.category_ids,
            customer_ids: self.customer_ids,
            customer_groups: self.customer_groups,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            priority: self.priority,
        }
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaxRuleRequest {
    #[validate(length(min = 1, max = 64, message = "code must be 1-64 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: Option<RuleType>,
    pub tax_type: Option<TaxType>,
    pub status: Option<RuleStatus>,
    pub rate: Option<Decimal>,
    pub method: Option<TaxMethod>,
    pub is_compound: Option<bool>,
    pub is_inclusive: Option<bool>,
    #[validate(custom(function = "validate_countries"))]
    pub countries: Option<Vec<String>>,
    pub states: Option<Vec<String>>,
    pub cities: Option<Vec<String>>,
    pub postal_codes: Option<Vec<String>>,
    pub product_ids: Option<Vec<String>>,
    pub category_ids: Option<Vec<String>>,
    pub customer_ids: Option<Vec<String>>,
    pub customer_groups: Option<Vec<String>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub priority: Option<i32>,
}

impl From<UpdateTaxRuleRequest> for UpdateTaxRule {
    fn from(req: UpdateTaxRuleRequest) -> Self {
        Self {
            code: req.code.map(|c| c.trim().to_string()),
            name: req.name,
            description: req.description,
            rule_type: req.rule_type,
            tax_type: req.tax_type,
            status: req.status,
            rate: req.rate,
            method: req.method,
            is_compound: req.is_compound,
            is_inclusive: req.is_inclusive,
            countries: req.countries.map(normalize_countries),
            states: req.states,
            cities: req.cities,
            postal_codes: req.postal_codes,
            product_ids: req.product_ids,
            category_ids: req.category_ids,
            customer_ids: req.customer_ids,
            customer_groups: req.customer_groups,
            min_amount: req.min_amount,
            max_amount: req.max_amount,
            valid_from: req.valid_from,
            valid_to: req.valid_to,
            priority: req.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRuleResponse {
    pub rule_id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub tax_type: TaxType,
    pub status: RuleStatus,
    pub rate: Decimal,
    pub method: TaxMethod,
    pub is_compound: bool,
    pub is_inclusive: bool,
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
    pub postal_codes: Vec<String>,
    pub product_ids: Vec<String>,
    pub category_ids: Vec<String>,
    pub customer_ids: Vec<String>,
    pub customer_groups: Vec<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaxRule> for TaxRuleResponse {
    fn from(rule: TaxRule) -> Self {
        Self {
            rule_id: rule.rule_id,
            tenant_id: rule.tenant_id,
            code: rule.code,
            name: rule.name,
            description: rule.description,
            rule_type: rule.rule_type,
            tax_type: rule.tax_type,
            status: rule.status,
            rate: rule.rate,
            method: rule.method,
            is_compound: rule.is_compound,
            is_inclusive: rule.is_inclusive,
            countries: rule.countries,
            states: rule.states,
            cities: rule.cities,
            postal_codes: rule.postal_codes,
            product_ids: rule.product_ids,
            category_ids: rule.category_ids,
            customer_ids: rule.customer_ids,
            customer_groups: rule.customer_groups,
            min_amount: rule.min_amount,
            max_amount: rule.max_amount,
            valid_from: rule.valid_from,
            valid_to: rule.valid_to,
            priority: rule.priority,
            created_at: rule.created_utc,
            updated_at: rule.updated_utc,
        }
    }
}

/// Query string for rule listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRulesParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: Option<String>,
    pub include_archived: Option<bool>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

impl ListRulesParams {
    pub fn into_filter(self) -> Result<ListTaxRulesFilter, TaxError> {
        Ok(ListTaxRulesFilter {
            status: self.status.as_deref().map(str::parse::<RuleStatus>).transpose()?,
            rule_type: self.rule_type.as_deref().map(str::parse::<RuleType>).transpose()?,
            include_archived: self.include_archived.unwrap_or(false),
            page_size: self.page_size.unwrap_or(0),
            page_token: self.page_token,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRulesResponse {
    pub rules: Vec<TaxRuleResponse>,
    /// Pass back as `pageToken` to fetch the next page. Absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}
