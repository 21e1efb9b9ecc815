//! Tax rate request and response bodies.

use crate::models::{CreateTaxRate, Location, TaxRate};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaxRateRequest {
    #[validate(length(equal = 2, message = "country must be a 2-letter code"))]
    pub country: String,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    pub rate: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl CreateTaxRateRequest {
    pub fn into_input(self, tenant_id: Uuid, rule_id: Uuid) -> CreateTaxRate {
        CreateTaxRate {
            tenant_id,
            rule_id,
            country: self.country.trim().to_ascii_uppercase(),
            state: self.state,
            city: self.city,
            postal_code: self.postal_code,
            rate: self.rate,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRateResponse {
    pub rate_id: Uuid,
    pub rule_id: Uuid,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub rate: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<TaxRate> for TaxRateResponse {
    fn from(rate: TaxRate) -> Self {
        Self {
            rate_id: rate.rate_id,
            rule_id: rate.rule_id,
            country: rate.country,
            state: rate.state,
            city: rate.city,
            postal_code: rate.postal_code,
            rate: rate.rate,
            valid_from: rate.valid_from,
            valid_to: rate.valid_to,
            is_active: rate.is_active,
            created_at: rate.created_utc,
        }
    }
}

/// Optional location scope for rate listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateListParams {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl RateListParams {
    /// `None` when no country is given, meaning every rate is listed.
    pub fn into_scope(self, now: DateTime<Utc>) -> Option<(Location, DateTime<Utc>)> {
        let country = self.country.filter(|c| !c.trim().is_empty())?;
        Some((
            Location {
                country,
                state: self.state,
                city: self.city,
                postal_code: self.postal_code,
            },
            self.date.unwrap_or(now),
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateRatesRequest {
    #[validate(length(min = 1, max = 1000, message = "rateIds must contain 1-1000 ids"))]
    pub rate_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeactivateRatesResponse {
    pub deactivated: u64,
}
