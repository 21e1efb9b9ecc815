//! In-memory store used when no database is configured, and by the tests.

use super::store::{CalculationRecorder, TaxRuleStore, DEFAULT_PAGE_SIZE};
use crate::engine::round2;
use crate::error::TaxError;
use crate::models::{
    CandidateRuleQuery, ListCalculationsFilter, ListTaxRulesFilter, RuleStatus, RuleTaxSummary,
    Tax, TaxRate, TaxRule, TaxSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct RuleTables {
    /// Insertion order is kept so equal-priority ties stay deterministic.
    rules: Vec<TaxRule>,
    rates: Vec<TaxRate>,
}

/// Process-local rule store and calculation recorder.
#[derive(Default)]
pub struct InMemoryStore {
    rules: RwLock<RuleTables>,
    taxes: RwLock<Vec<Tax>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn add(total: Decimal, value: Decimal) -> Result<Decimal, TaxError> {
    total.checked_add(value).ok_or(TaxError::AmountOutOfRange)
}

fn in_window(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
}

#[async_trait]
impl TaxRuleStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_candidate_rules(
        &self,
        tenant_id: Uuid,
        query: &CandidateRuleQuery,
    ) -> Result<Vec<TaxRule>, AppError> {
        let tables = self.rules.read().await;
        let mut candidates: Vec<TaxRule> = tables
            .rules
            .iter()
            .filter(|rule| rule.tenant_id == tenant_id && rule.status == RuleStatus::Active)
            .filter(|rule| rule.is_valid_for_date(query.date))
            .filter(|rule| rule.is_valid_for_amount(query.amount))
            .cloned()
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_utc.cmp(&b.created_utc))
        });
        Ok(candidates)
    }

    async fn create_rule(&self, rule: &TaxRule) -> Result<TaxRule, AppError> {
        let mut tables = self.rules.write().await;
        if tables
            .rules
            .iter()
            .any(|r| r.tenant_id == rule.tenant_id && r.code == rule.code)
        {
            return Err(TaxError::RuleCodeExists(rule.code.clone()).into());
        }
        tables.rules.push(rule.clone());
        Ok(rule.clone())
    }

    async fn get_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Option<TaxRule>, AppError> {
        let tables = self.rules.read().await;
        Ok(tables
            .rules
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.rule_id == rule_id)
            .cloned())
    }

    async fn list_rules(
        &self,
        tenant_id: Uuid,
        filter: &ListTaxRulesFilter,
    ) -> Result<Vec<TaxRule>, AppError> {
        let page_size = if filter.page_size > 0 {
            filter.page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let limit = page_size.clamp(1, 100) as usize;
        let include_archived =
            filter.include_archived || filter.status == Some(RuleStatus::Archived);

        let tables = self.rules.read().await;
        let mut rules: Vec<TaxRule> = tables
            .rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .filter(|r| filter.rule_type.map_or(true, |rule_type| r.rule_type == rule_type))
            .filter(|r| include_archived || r.status != RuleStatus::Archived)
            .filter(|r| filter.page_token.map_or(true, |cursor| r.rule_id > cursor))
            .cloned()
            .collect();

        rules.sort_by_key(|r| r.rule_id);
        rules.truncate(limit);
        Ok(rules)
    }

    async fn update_rule(&self, rule: &TaxRule) -> Result<Option<TaxRule>, AppError> {
        let mut tables = self.rules.write().await;
        if tables.rules.iter().any(|r| {
            r.tenant_id == rule.tenant_id && r.code == rule.code && r.rule_id != rule.rule_id
        }) {
            return Err(TaxError::RuleCodeExists(rule.code.clone()).into());
        }

        let Some(existing) = tables
            .rules
            .iter_mut()
            .find(|r| r.tenant_id == rule.tenant_id && r.rule_id == rule.rule_id)
        else {
            return Ok(None);
        };
        *existing = rule.clone();
        Ok(Some(rule.clone()))
    }

    async fn archive_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TaxRule>, AppError> {
        let mut tables = self.rules.write().await;
        let Some(existing) = tables
            .rules
            .iter_mut()
            .find(|r| r.tenant_id == tenant_id && r.rule_id == rule_id)
        else {
            return Ok(None);
        };
        existing.status = RuleStatus::Archived;
        existing.updated_utc = now;
        Ok(Some(existing.clone()))
    }

    async fn code_exists(
        &self,
        tenant_id: Uuid,
        code: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let tables = self.rules.read().await;
        Ok(tables.rules.iter().any(|r| {
            r.tenant_id == tenant_id && r.code == code && Some(r.rule_id) != excluding
        }))
    }

    async fn create_rate(&self, rate: &TaxRate) -> Result<TaxRate, AppError> {
        let mut tables = self.rules.write().await;
        tables.rates.push(rate.clone());
        Ok(rate.clone())
    }

    async fn list_rates(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Vec<TaxRate>, AppError> {
        let tables = self.rules.read().await;
        Ok(tables
            .rates
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn deactivate_rates(&self, tenant_id: Uuid, rate_ids: &[Uuid]) -> Result<u64, AppError> {
        let mut tables = self.rules.write().await;
        let mut changed = 0;
        for rate in tables
            .rates
            .iter_mut()
            .filter(|r| r.tenant_id == tenant_id && r.is_active && rate_ids.contains(&r.rate_id))
        {
            rate.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl CalculationRecorder for InMemoryStore {
    async fn record_calculation(&self, tax: &Tax) -> Result<(), AppError> {
        let mut ordered = tax.clone();
        ordered.applications.sort_by_key(|application| application.sequence);
        self.taxes.write().await.push(ordered);
        Ok(())
    }

    async fn get_calculation(
        &self,
        tenant_id: Uuid,
        tax_id: Uuid,
    ) -> Result<Option<Tax>, AppError> {
        let taxes = self.taxes.read().await;
        Ok(taxes
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.tax_id == tax_id)
            .cloned())
    }

    async fn list_calculations(
        &self,
        tenant_id: Uuid,
        filter: &ListCalculationsFilter,
    ) -> Result<Vec<Tax>, AppError> {
        let limit = filter.limit.clamp(1, 100) as usize;
        let taxes = self.taxes.read().await;

        // Newest first; records are appended in commit order.
        Ok(taxes
            .iter()
            .rev()
            .filter(|t| t.tenant_id == tenant_id)
            .filter(|t| in_window(t.calculated_utc, filter.from, filter.to))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn summarize(
        &self,
        tenant_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<TaxSummary, AppError> {
        let taxes = self.taxes.read().await;

        let mut calculation_count = 0;
        let mut total_taxable_amount = Decimal::ZERO;
        let mut total_tax_amount = Decimal::ZERO;
        let mut per_rule: HashMap<Uuid, RuleTaxSummary> = HashMap::new();

        for tax in taxes
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .filter(|t| in_window(t.calculated_utc, from, to))
        {
            calculation_count += 1;
            total_taxable_amount = add(total_taxable_amount, tax.taxable_amount)?;
            total_tax_amount = add(total_tax_amount, tax.tax_amount)?;

            for application in &tax.applications {
                let entry = per_rule
                    .entry(application.rule_id)
                    .or_insert_with(|| RuleTaxSummary {
                        rule_id: application.rule_id,
                        rule_code: application.rule_code.clone(),
                        applications: 0,
                        tax_amount: Decimal::ZERO,
                    });
                // Later records carry the most recent code.
                entry.rule_code = application.rule_code.clone();
                entry.applications += 1;
                entry.tax_amount = add(entry.tax_amount, application.tax_amount)?;
            }
        }

        let mut rules: Vec<RuleTaxSummary> = per_rule
            .into_values()
            .map(|mut summary| {
                summary.tax_amount = round2(summary.tax_amount);
                summary
            })
            .collect();
        rules.sort_by(|a, b| {
            b.tax_amount
                .cmp(&a.tax_amount)
                .then(a.rule_id.cmp(&b.rule_id))
        });

        Ok(TaxSummary {
            calculation_count,
            total_taxable_amount: round2(total_taxable_amount),
            total_tax_amount: round2(total_tax_amount),
            rules,
        })
    }
}
