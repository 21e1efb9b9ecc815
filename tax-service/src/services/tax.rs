//! Tax service: orchestrates rule lookup, the engine and calculation recording.

use crate::engine::{is_country_code, round2, TaxCalculation, TaxEngine, TaxQuery};
use crate::error::TaxError;
use crate::models::{
    CandidateRuleQuery, CreateTaxRate, CreateTaxRule, ListCalculationsFilter, ListTaxRulesFilter,
    Location, RuleStatus, Tax, TaxRate, TaxRule, TaxRuleApplication, TaxSummary, UpdateTaxRule,
};
use crate::services::metrics::{
    record_calculation, record_calculation_duration, record_error, record_rate_operation,
    record_rule_operation, record_tax_amount,
};
use crate::services::store::{CalculationRecorder, TaxRuleStore};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A committed calculation and the id it was recorded under.
#[derive(Debug, Clone)]
pub struct CommittedCalculation {
    pub tax_id: Uuid,
    pub calculation: TaxCalculation,
}

pub struct TaxService {
    rules: Arc<dyn TaxRuleStore>,
    recorder: Arc<dyn CalculationRecorder>,
    engine: TaxEngine,
}

impl TaxService {
    pub fn new(
        rules: Arc<dyn TaxRuleStore>,
        recorder: Arc<dyn CalculationRecorder>,
        engine: TaxEngine,
    ) -> Self {
        Self {
            rules,
            recorder,
            engine,
        }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.rules.health_check().await
    }

    // =========================================================================
    // Calculation
    // =========================================================================

    /// Run the engine without persisting anything.
    #[instrument(
        skip(self, query),
        fields(tenant_id = %tenant_id, country = %query.location.country)
    )]
    pub async fn preview(
        &self,
        tenant_id: Uuid,
        query: &TaxQuery,
    ) -> Result<TaxCalculation, AppError> {
        self.evaluate(tenant_id, query, "preview").await
    }

    /// Run the engine and record the result with its audit trail.
    #[instrument(
        skip(self, query),
        fields(tenant_id = %tenant_id, country = %query.location.country)
    )]
    pub async fn calculate(
        &self,
        tenant_id: Uuid,
        query: &TaxQuery,
    ) -> Result<CommittedCalculation, AppError> {
        let calculation = self.evaluate(tenant_id, query, "commit").await?;
        let tax = build_record(tenant_id, query, &calculation);

        self.recorder.record_calculation(&tax).await.map_err(|e| {
            record_error(e.kind(), "record_calculation");
            e
        })?;

        if let Some(amount) = tax.tax_amount.to_f64() {
            record_tax_amount(&tenant_id.to_string(), &tax.currency, amount);
        }
        info!(
            tax_id = %tax.tax_id,
            tax_amount = %tax.tax_amount,
            rules_applied = tax.applications.len(),
            "Tax calculation committed"
        );

        Ok(CommittedCalculation {
            tax_id: tax.tax_id,
            calculation,
        })
    }

    /// Rules that would apply to `query`, in application order.
    #[instrument(skip(self, query), fields(tenant_id = %tenant_id))]
    pub async fn applicable_rules(
        &self,
        tenant_id: Uuid,
        query: &TaxQuery,
    ) -> Result<Vec<TaxRule>, AppError> {
        query.validate()?;
        let candidates = self.candidates(tenant_id, query).await?;
        Ok(self
            .engine
            .select_rules(query, &candidates)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn candidates(
        &self,
        tenant_id: Uuid,
        query: &TaxQuery,
    ) -> Result<Vec<TaxRule>, AppError> {
        self.rules
            .find_candidate_rules(
                tenant_id,
                &CandidateRuleQuery {
                    amount: query.amount,
                    date: query.date,
                },
            )
            .await
    }

    async fn evaluate(
        &self,
        tenant_id: Uuid,
        query: &TaxQuery,
        mode: &str,
    ) -> Result<TaxCalculation, AppError> {
        let tenant = tenant_id.to_string();
        let method = query.method.as_str();

        if let Err(e) = query.validate() {
            record_calculation(&tenant, method, mode, e.code());
            return Err(e.into());
        }

        let candidates = self.candidates(tenant_id, query).await?;

        let start = Instant::now();
        let result = self.engine.calculate(query, &candidates, Utc::now());
        record_calculation_duration(mode, start.elapsed().as_secs_f64());

        match result {
            Ok(calculation) => {
                record_calculation(&tenant, method, mode, "ok");
                Ok(calculation)
            }
            Err(e) => {
                if matches!(e, TaxError::AmountOutOfRange) {
                    warn!(amount = %query.amount, "Tax calculation overflowed");
                }
                record_calculation(&tenant, method, mode, e.code());
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Rule Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, code = %input.code))]
    pub async fn create_rule(&self, input: CreateTaxRule) -> Result<TaxRule, AppError> {
        let rule = TaxRule::from_input(input, Utc::now());
        rule.check_invariants()?;

        if self
            .rules
            .code_exists(rule.tenant_id, &rule.code, None)
            .await?
        {
            return Err(TaxError::RuleCodeExists(rule.code).into());
        }

        let created = self.rules.create_rule(&rule).await?;
        record_rule_operation(&created.tenant_id.to_string(), "create");
        Ok(created)
    }

    pub async fn get_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<TaxRule, AppError> {
        self.rules
            .get_rule(tenant_id, rule_id)
            .await?
            .ok_or_else(|| TaxError::RuleNotFound(rule_id).into())
    }

    pub async fn list_rules(
        &self,
        tenant_id: Uuid,
        filter: &ListTaxRulesFilter,
    ) -> Result<Vec<TaxRule>, AppError> {
        self.rules.list_rules(tenant_id, filter).await
    }

    /// Merge `update` into the stored rule, re-checking invariants and code uniqueness.
    #[instrument(skip(self, update), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    pub async fn update_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        update: UpdateTaxRule,
    ) -> Result<TaxRule, AppError> {
        let mut rule = self.get_rule(tenant_id, rule_id).await?;
        let code_changed = update.code.as_ref().is_some_and(|code| *code != rule.code);
        // Archiving follows the same lifecycle as delete.
        if update.status == Some(RuleStatus::Archived) && rule.status == RuleStatus::Active {
            return Err(TaxError::CannotDeleteRule(rule_id).into());
        }

        rule.apply_update(update, Utc::now());
        rule.check_invariants()?;

        if code_changed
            && self
                .rules
                .code_exists(tenant_id, &rule.code, Some(rule_id))
                .await?
        {
            return Err(TaxError::RuleCodeExists(rule.code).into());
        }

        let updated = self
            .rules
            .update_rule(&rule)
            .await?
            .ok_or(TaxError::RuleNotFound(rule_id))?;

        record_rule_operation(&tenant_id.to_string(), "update");
        Ok(updated)
    }

    /// Archive a rule. Active rules must be deactivated first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    pub async fn delete_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<(), AppError> {
        let rule = self.get_rule(tenant_id, rule_id).await?;
        if rule.status == RuleStatus::Active {
            return Err(TaxError::CannotDeleteRule(rule_id).into());
        }

        self.rules
            .archive_rule(tenant_id, rule_id, Utc::now())
            .await?
            .ok_or(TaxError::RuleNotFound(rule_id))?;

        record_rule_operation(&tenant_id.to_string(), "archive");
        Ok(())
    }

    // =========================================================================
    // Rate Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, rule_id = %input.rule_id))]
    pub async fn create_rate(&self, input: CreateTaxRate) -> Result<TaxRate, AppError> {
        if !is_country_code(&input.country) {
            return Err(TaxError::InvalidLocation(input.country).into());
        }
        if input.rate < Decimal::ZERO {
            return Err(TaxError::InvalidRule("rate must not be negative".to_string()).into());
        }
        if let (Some(from), Some(to)) = (input.valid_from, input.valid_to) {
            if from > to {
                return Err(TaxError::InvalidRule(
                    "valid_from must not be after valid_to".to_string(),
                )
                .into());
            }
        }

        self.get_rule(input.tenant_id, input.rule_id).await?;

        let rate = self
            .rules
            .create_rate(&TaxRate::from_input(input, Utc::now()))
            .await?;
        record_rate_operation(&rate.tenant_id.to_string(), "create");
        Ok(rate)
    }

    /// Rates of a rule, optionally narrowed to those covering `scope`.
    pub async fn list_rates(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        scope: Option<(Location, DateTime<Utc>)>,
    ) -> Result<Vec<TaxRate>, AppError> {
        self.get_rule(tenant_id, rule_id).await?;
        let rates = self.rules.list_rates(tenant_id, rule_id).await?;

        Ok(match scope {
            Some((location, date)) => rates
                .into_iter()
                .filter(|rate| rate.applies_to(&location, date))
                .collect(),
            None => rates,
        })
    }

    #[instrument(skip(self, rate_ids), fields(tenant_id = %tenant_id))]
    pub async fn deactivate_rates(
        &self,
        tenant_id: Uuid,
        rate_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let changed = self.rules.deactivate_rates(tenant_id, rate_ids).await?;
        record_rate_operation(&tenant_id.to_string(), "deactivate");
        Ok(changed)
    }

    // =========================================================================
    // History
    // =========================================================================

    pub async fn get_calculation(&self, tenant_id: Uuid, tax_id: Uuid) -> Result<Tax, AppError> {
        self.recorder
            .get_calculation(tenant_id, tax_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Tax calculation {} not found", tax_id))
            })
    }

    pub async fn list_calculations(
        &self,
        tenant_id: Uuid,
        filter: &ListCalculationsFilter,
    ) -> Result<Vec<Tax>, AppError> {
        self.recorder.list_calculations(tenant_id, filter).await
    }

    pub async fn summarize(
        &self,
        tenant_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<TaxSummary, AppError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "from must not be after to"
                )));
            }
        }
        self.recorder.summarize(tenant_id, from, to).await
    }
}

/// Audit record for a committed calculation. Applications keep applied order.
fn build_record(tenant_id: Uuid, query: &TaxQuery, calculation: &TaxCalculation) -> Tax {
    let tax_id = Uuid::new_v4();
    let applications = calculation
        .applied_rules
        .iter()
        .enumerate()
        .map(|(index, applied)| TaxRuleApplication {
            application_id: Uuid::new_v4(),
            tax_id,
            sequence: index as i32,
            rule_id: applied.rule_id,
            rule_code: applied.code.clone(),
            rule_name: applied.name.clone(),
            tax_type: applied.tax_type,
            is_compound: applied.is_compound,
            priority: applied.priority,
            rate: applied.rate,
            taxable_amount: applied.taxable_amount,
            tax_amount: applied.tax_amount,
        })
        .collect();

    Tax {
        tax_id,
        tenant_id,
        amount: calculation.amount,
        taxable_amount: calculation.taxable_amount,
        tax_amount: calculation.tax_amount,
        total_amount: calculation.total_amount,
        tax_rate: round2(calculation.effective_rate),
        tax_type: calculation.primary_tax_type(),
        method: calculation.method,
        currency: calculation.currency.clone(),
        country: query.location.country.to_ascii_uppercase(),
        state: query.location.state.clone(),
        city: query.location.city.clone(),
        postal_code: query.location.postal_code.clone(),
        product_id: query.product_id.clone(),
        customer_id: query.customer_id.clone(),
        calculated_utc: calculation.calculated_at,
        applications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleType, TaxMethod, TaxType};
    use crate::services::InMemoryStore;
    use axum::http::StatusCode;
    use chrono::TimeZone;

    fn tenant() -> Uuid {
        Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
    }

    fn service(store: Arc<InMemoryStore>) -> TaxService {
        TaxService::new(store.clone(), store, TaxEngine::default())
    }

    fn create_input(code: &str, rate: i64, priority: i32) -> CreateTaxRule {
        CreateTaxRule {
            tenant_id: tenant(),
            code: code.to_string(),
            name: format!("{} rule", code),
            description: None,
            rule_type: RuleType::Location,
            tax_type: TaxType::Percentage,
            status: RuleStatus::Active,
            rate: Decimal::from(rate),
            method: TaxMethod::Exclusive,
            is_compound: false,
            is_inclusive: false,
            countries: vec!["US".to_string()],
            states: vec![],
            cities: vec![],
            postal_codes: vec![],
            product_ids: vec![],
            category_ids: vec![],
            customer_ids: vec![],
            customer_groups: vec![],
            min_amount: None,
            max_amount: None,
            valid_from: None,
            valid_to: None,
            priority,
        }
    }

    fn us_query(amount: i64) -> TaxQuery {
        TaxQuery {
            amount: Decimal::from(amount),
            location: Location {
                country: "US".to_string(),
                ..Default::default()
            },
            product_id: None,
            customer_id: None,
            category_ids: None,
            customer_groups: None,
            method: TaxMethod::Exclusive,
            date: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn commit_records_applications_in_applied_order() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        service.create_rule(create_input("LOW", 2, 5)).await.unwrap();
        service.create_rule(create_input("HIGH", 8, 10)).await.unwrap();

        let committed = service.calculate(tenant(), &us_query(100)).await.unwrap();
        let record = service
            .get_calculation(tenant(), committed.tax_id)
            .await
            .unwrap();

        let codes: Vec<&str> = record
            .applications
            .iter()
            .map(|a| a.rule_code.as_str())
            .collect();
        assert_eq!(codes, vec!["HIGH", "LOW"]);
        assert_eq!(record.applications[0].sequence, 0);
        assert_eq!(record.tax_amount, Decimal::new(1000, 2));
    }

    #[tokio::test]
    async fn preview_does_not_record() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        service.create_rule(create_input("VAT", 10, 0)).await.unwrap();

        service.preview(tenant(), &us_query(100)).await.unwrap();
        service.preview(tenant(), &us_query(100)).await.unwrap();

        let history = service
            .list_calculations(
                tenant(),
                &ListCalculationsFilter {
                    limit: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn failed_calculation_records_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        service.create_rule(create_input("VAT", 10, 0)).await.unwrap();

        let mut query = us_query(100);
        query.location.country = "GB".to_string();
        let err = service.calculate(tenant(), &query).await.unwrap_err();
        assert_eq!(err.kind(), "NO_APPLICABLE_RULES");

        let summary = service.summarize(tenant(), None, None).await.unwrap();
        assert_eq!(summary.calculation_count, 0);
    }

    #[tokio::test]
    async fn code_change_to_existing_code_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store);
        service.create_rule(create_input("A", 1, 0)).await.unwrap();
        let b = service.create_rule(create_input("B", 1, 0)).await.unwrap();

        let err = service
            .update_rule(
                tenant(),
                b.rule_id,
                UpdateTaxRule {
                    code: Some("A".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_rejects_broken_invariants() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store);
        let rule = service.create_rule(create_input("A", 1, 0)).await.unwrap();

        let err = service
            .update_rule(
                tenant(),
                rule.rule_id,
                UpdateTaxRule {
                    rate: Some(Decimal::from(-1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_RULE");

        let stored = service.get_rule(tenant(), rule.rule_id).await.unwrap();
        assert_eq!(stored.rate, Decimal::from(1));
    }

    #[tokio::test]
    async fn active_rule_cannot_be_deleted_until_deactivated() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store);
        let rule = service.create_rule(create_input("A", 1, 0)).await.unwrap();

        let err = service.delete_rule(tenant(), rule.rule_id).await.unwrap_err();
        assert_eq!(err.kind(), "CANNOT_DELETE_RULE");

        service
            .update_rule(
                tenant(),
                rule.rule_id,
                UpdateTaxRule {
                    status: Some(RuleStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.delete_rule(tenant(), rule.rule_id).await.unwrap();

        let archived = service.get_rule(tenant(), rule.rule_id).await.unwrap();
        assert_eq!(archived.status, RuleStatus::Archived);
    }

    #[tokio::test]
    async fn rules_are_isolated_per_tenant() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store);
        let rule = service.create_rule(create_input("VAT", 10, 0)).await.unwrap();

        let other = Uuid::new_v4();
        let err = service.get_rule(other, rule.rule_id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = service.preview(other, &us_query(100)).await.unwrap_err();
        assert_eq!(err.kind(), "NO_APPLICABLE_RULES");
    }
}
