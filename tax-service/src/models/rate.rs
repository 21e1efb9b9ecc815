//! Tax rate model.

use super::Location;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Location/time scoped rate value attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRate {
    pub rate_id: Uuid,
    pub tenant_id: Uuid,
    pub rule_id: Uuid,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub rate: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl TaxRate {
    pub fn from_input(input: CreateTaxRate, now: DateTime<Utc>) -> Self {
        Self {
            rate_id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            rule_id: input.rule_id,
            country: input.country,
            state: input.state,
            city: input.city,
            postal_code: input.postal_code,
            rate: input.rate,
            valid_from: input.valid_from,
            valid_to: input.valid_to,
            is_active: true,
            created_utc: now,
        }
    }

    /// Whether this rate covers `location` at `date`.
    ///
    /// State, city and postal code only constrain when the rate sets them.
    pub fn applies_to(&self, location: &Location, date: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.valid_from.is_some_and(|from| date < from) {
            return false;
        }
        if self.valid_to.is_some_and(|to| date > to) {
            return false;
        }
        if !self.country.eq_ignore_ascii_case(location.country.trim()) {
            return false;
        }

        field_matches(self.state.as_deref(), location.state.as_deref())
            && field_matches(self.city.as_deref(), location.city.as_deref())
            && field_matches(self.postal_code.as_deref(), location.postal_code.as_deref())
    }
}

fn field_matches(scoped: Option<&str>, requested: Option<&str>) -> bool {
    match scoped.map(str::trim).filter(|s| !s.is_empty()) {
        None => true,
        Some(expected) => {
            requested.is_some_and(|value| expected.eq_ignore_ascii_case(value.trim()))
        }
    }
}

/// Input for creating a tax rate.
#[derive(Debug, Clone)]
pub struct CreateTaxRate {
    pub tenant_id: Uuid,
    pub rule_id: Uuid,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub rate: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}
