//! Storage seams for tax-service.
//!
//! [`Database`](super::Database) is the production implementation;
//! [`InMemoryStore`](super::InMemoryStore) serves local runs without a
//! database and the integration tests.

use crate::models::{
    CandidateRuleQuery, ListCalculationsFilter, ListTaxRulesFilter, Tax, TaxRate, TaxRule,
    TaxSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Default page size for rule listings.
pub const DEFAULT_PAGE_SIZE: i32 = 50;

/// Persistence of tax rules and their rates.
#[async_trait]
pub trait TaxRuleStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Active rules whose date and amount windows admit `query`, ordered by
    /// priority (descending) then creation time. May return a superset of the
    /// rules the engine finally selects.
    async fn find_candidate_rules(
        &self,
        tenant_id: Uuid,
        query: &CandidateRuleQuery,
    ) -> Result<Vec<TaxRule>, AppError>;

    /// Insert a rule. A duplicate `(tenant_id, code)` yields `RuleCodeExists`.
    async fn create_rule(&self, rule: &TaxRule) -> Result<TaxRule, AppError>;

    async fn get_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Option<TaxRule>, AppError>;

    /// Rules ordered by id, starting after `filter.page_token`.
    async fn list_rules(
        &self,
        tenant_id: Uuid,
        filter: &ListTaxRulesFilter,
    ) -> Result<Vec<TaxRule>, AppError>;

    /// Overwrite a stored rule with `rule`. Returns `None` if it does not exist.
    async fn update_rule(&self, rule: &TaxRule) -> Result<Option<TaxRule>, AppError>;

    /// Set a rule's status to archived. Returns `None` if it does not exist.
    async fn archive_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TaxRule>, AppError>;

    /// Whether `code` is taken within the tenant by a rule other than `excluding`.
    async fn code_exists(
        &self,
        tenant_id: Uuid,
        code: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, AppError>;

    async fn create_rate(&self, rate: &TaxRate) -> Result<TaxRate, AppError>;

    async fn list_rates(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Vec<TaxRate>, AppError>;

    /// Deactivate the given rates. Returns how many changed from active to inactive.
    async fn deactivate_rates(&self, tenant_id: Uuid, rate_ids: &[Uuid]) -> Result<u64, AppError>;
}

/// Persistence of committed calculations and their audit trail.
#[async_trait]
pub trait CalculationRecorder: Send + Sync {
    /// Store the calculation and all of its rule applications atomically.
    async fn record_calculation(&self, tax: &Tax) -> Result<(), AppError>;

    async fn get_calculation(&self, tenant_id: Uuid, tax_id: Uuid) -> Result<Option<Tax>, AppError>;

    /// Calculations newest first.
    async fn list_calculations(
        &self,
        tenant_id: Uuid,
        filter: &ListCalculationsFilter,
    ) -> Result<Vec<Tax>, AppError>;

    async fn summarize(
        &self,
        tenant_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<TaxSummary, AppError>;
}
