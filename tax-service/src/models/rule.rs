//! Tax rule model.

use crate::error::TaxError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// What a rule is keyed on. Informational; matching is driven by the scope lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Product,
    Category,
    Location,
    Customer,
    Global,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Product => "product",
            RuleType::Category => "category",
            RuleType::Location => "location",
            RuleType::Customer => "customer",
            RuleType::Global => "global",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "product" => RuleType::Product,
            "category" => RuleType::Category,
            "location" => RuleType::Location,
            "customer" => RuleType::Customer,
            _ => RuleType::Global,
        }
    }
}

impl FromStr for RuleType {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "product" => Ok(RuleType::Product),
            "category" => Ok(RuleType::Category),
            "location" => Ok(RuleType::Location),
            "customer" => Ok(RuleType::Customer),
            "global" => Ok(RuleType::Global),
            other => Err(TaxError::InvalidRule(format!("unknown rule type '{}'", other))),
        }
    }
}

/// How a rule's `rate` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    /// `rate` is a percentage of the taxable base.
    Percentage,
    /// `rate` is a flat currency amount.
    Fixed,
    /// Percentage rule intended to stack on previously applied tax.
    Compound,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Percentage => "percentage",
            TaxType::Fixed => "fixed",
            TaxType::Compound => "compound",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed" => TaxType::Fixed,
            "compound" => TaxType::Compound,
            _ => TaxType::Percentage,
        }
    }
}

/// Rule lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Inactive,
    Archived,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
            RuleStatus::Archived => "archived",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => RuleStatus::Active,
            "archived" => RuleStatus::Archived,
            _ => RuleStatus::Inactive,
        }
    }
}

impl FromStr for RuleStatus {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(RuleStatus::Active),
            "inactive" => Ok(RuleStatus::Inactive),
            "archived" => Ok(RuleStatus::Archived),
            other => Err(TaxError::InvalidRule(format!("unknown status '{}'", other))),
        }
    }
}

/// Whether the quoted amount already contains tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxMethod {
    Inclusive,
    #[default]
    Exclusive,
}

impl TaxMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxMethod::Inclusive => "inclusive",
            TaxMethod::Exclusive => "exclusive",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "inclusive" => TaxMethod::Inclusive,
            _ => TaxMethod::Exclusive,
        }
    }
}

impl FromStr for TaxMethod {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inclusive" => Ok(TaxMethod::Inclusive),
            "exclusive" => Ok(TaxMethod::Exclusive),
            _ => Err(TaxError::InvalidMethod(s.to_string())),
        }
    }
}

/// A tenant-scoped, priority-ordered tax policy.
///
/// Every scope list is an inclusion list; an empty list places no restriction
/// on that dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRule {
    pub rule_id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
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
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TaxRule {
    /// Build a new active rule from creation input.
    pub fn from_input(input: CreateTaxRule, now: DateTime<Utc>) -> Self {
        Self {
            rule_id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            code: input.code,
            name: input.name,
            description: input.description,
            rule_type: input.rule_type,
            tax_type: input.tax_type,
            status: input.status,
            rate: input.rate,
            method: input.method,
            is_compound: input.is_compound,
            is_inclusive: input.is_inclusive,
            countries: input.countries,
            states: input.states,
            cities: input.cities,
            postal_codes: input.postal_codes,
            product_ids: input.product_ids,
            category_ids: input.category_ids,
            customer_ids: input.customer_ids,
            customer_groups: input.customer_groups,
            min_amount: input.min_amount,
            max_amount: input.max_amount,
            valid_from: input.valid_from,
            valid_to: input.valid_to,
            priority: input.priority,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Check the rate, amount-bound and validity-window invariants.
    pub fn check_invariants(&self) -> Result<(), TaxError> {
        if self.rate < Decimal::ZERO {
            return Err(TaxError::InvalidRule("rate must not be negative".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(TaxError::InvalidRule(
                    "min_amount must not exceed max_amount".to_string(),
                ));
            }
        }
        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if from > to {
                return Err(TaxError::InvalidRule(
                    "valid_from must not be after valid_to".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Merge a partial update into this rule.
    pub fn apply_update(&mut self, update: UpdateTaxRule, now: DateTime<Utc>) {
        if let Some(code) = update.code {
            self.code = code;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(rule_type) = update.rule_type {
            self.rule_type = rule_type;
        }
        if let Some(tax_type) = update.tax_type {
            self.tax_type = tax_type;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(rate) = update.rate {
            self.rate = rate;
        }
        if let Some(method) = update.method {
            self.method = method;
        }
        if let Some(is_compound) = update.is_compound {
            self.is_compound = is_compound;
        }
        if let Some(is_inclusive) = update.is_inclusive {
            self.is_inclusive = is_inclusive;
        }
        if let Some(countries) = update.countries {
            self.countries = countries;
        }
        if let Some(states) = update.states {
            self.states = states;
        }
        if let Some(cities) = update.cities {
            self.cities = cities;
        }
        if let Some(postal_codes) = update.postal_codes {
            self.postal_codes = postal_codes;
        }
        if let Some(product_ids) = update.product_ids {
            self.product_ids = product_ids;
        }
        if let Some(category_ids) = update.category_ids {
            self.category_ids = category_ids;
        }
        if let Some(customer_ids) = update.customer_ids {
            self.customer_ids = customer_ids;
        }
        if let Some(customer_groups) = update.customer_groups {
            self.customer_groups = customer_groups;
        }
        if let Some(min_amount) = update.min_amount {
            self.min_amount = Some(min_amount);
        }
        if let Some(max_amount) = update.max_amount {
            self.max_amount = Some(max_amount);
        }
        if let Some(valid_from) = update.valid_from {
            self.valid_from = Some(valid_from);
        }
        if let Some(valid_to) = update.valid_to {
            self.valid_to = Some(valid_to);
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        self.updated_utc = now;
    }
}

/// Input for creating a tax rule.
#[derive(Debug, Clone)]
pub struct CreateTaxRule {
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
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
}

/// Input for updating a tax rule. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaxRule {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub rule_type: Option<RuleType>,
    pub tax_type: Option<TaxType>,
    pub status: Option<RuleStatus>,
    pub rate: Option<Decimal>,
    pub method: Option<TaxMethod>,
    pub is_compound: Option<bool>,
    pub is_inclusive: Option<bool>,
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

/// Filter parameters for listing rules.
#[derive(Debug, Clone, Default)]
pub struct ListTaxRulesFilter {
    pub status: Option<RuleStatus>,
    pub rule_type: Option<RuleType>,
    pub include_archived: bool,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Coarse pre-filter handed to a rule store when fetching calculation candidates.
///
/// Stores may return a superset; the engine re-applies the full predicate.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRuleQuery {
    pub amount: Decimal,
    pub date: DateTime<Utc>,
}
