//! Database service for tax-service.

use crate::engine::round2;
use crate::error::TaxError;
use crate::models::{
    CandidateRuleQuery, ListCalculationsFilter, ListTaxRulesFilter, RuleStatus, RuleTaxSummary,
    RuleType, Tax, TaxMethod, TaxRate, TaxRule, TaxRuleApplication, TaxSummary, TaxType,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{CalculationRecorder, TaxRuleStore, DEFAULT_PAGE_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const RULE_COLUMNS: &str = "rule_id, tenant_id, code, name, description, rule_type, tax_type, status, rate, method, is_compound, is_inclusive, countries, states, cities, postal_codes, product_ids, category_ids, customer_ids, customer_groups, min_amount, max_amount, valid_from, valid_to, priority, created_utc, updated_utc";

const RATE_COLUMNS: &str = "rate_id, tenant_id, rule_id, country, state, city, postal_code, rate, valid_from, valid_to, is_active, created_utc";

const TAX_COLUMNS: &str = "tax_id, tenant_id, amount, taxable_amount, tax_amount, total_amount, tax_rate, tax_type, method, currency, country, state, city, postal_code, product_id, customer_id, calculated_utc";

const APPLICATION_COLUMNS: &str = "application_id, tax_id, sequence, rule_id, rule_code, rule_name, tax_type, is_compound, priority, rate, taxable_amount, tax_amount";

#[derive(Debug, FromRow)]
struct TaxRuleRow {
    rule_id: Uuid,
    tenant_id: Uuid,
    code: String,
    name: String,
    description: Option<String>,
    rule_type: String,
    tax_type: String,
    status: String,
    rate: Decimal,
    method: String,
    is_compound: bool,
    is_inclusive: bool,
    countries: Vec<String>,
    states: Vec<String>,
    cities: Vec<String>,
    postal_codes: Vec<String>,
    product_ids: Vec<String>,
    category_ids: Vec<String>,
    customer_ids: Vec<String>,
    customer_groups: Vec<String>,
    min_amount: Option<Decimal>,
    max_amount: Option<Decimal>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    priority: i32,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<TaxRuleRow> for TaxRule {
    fn from(row: TaxRuleRow) -> Self {
        Self {
            rule_id: row.rule_id,
            tenant_id: row.tenant_id,
            code: row.code,
            name: row.name,
            description: row.description,
            rule_type: RuleType::from_string(&row.rule_type),
            tax_type: TaxType::from_string(&row.tax_type),
            status: RuleStatus::from_string(&row.status),
            rate: row.rate.normalize(),
            method: TaxMethod::from_string(&row.method),
            is_compound: row.is_compound,
            is_inclusive: row.is_inclusive,
            countries: row.countries,
            states: row.states,
            cities: row.cities,
            postal_codes: row.postal_codes,
            product_ids: row.product_ids,
            category_ids: row.category_ids,
            customer_ids: row.customer_ids,
            customer_groups: row.customer_groups,
            min_amount: row.min_amount.map(|v| v.normalize()),
            max_amount: row.max_amount.map(|v| v.normalize()),
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            priority: row.priority,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaxRateRow {
    rate_id: Uuid,
    tenant_id: Uuid,
    rule_id: Uuid,
    country: String,
    state: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    rate: Decimal,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    is_active: bool,
    created_utc: DateTime<Utc>,
}

impl From<TaxRateRow> for TaxRate {
    fn from(row: TaxRateRow) -> Self {
        Self {
            rate_id: row.rate_id,
            tenant_id: row.tenant_id,
            rule_id: row.rule_id,
            country: row.country,
            state: row.state,
            city: row.city,
            postal_code: row.postal_code,
            rate: row.rate.normalize(),
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            is_active: row.is_active,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaxRow {
    tax_id: Uuid,
    tenant_id: Uuid,
    amount: Decimal,
    taxable_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    tax_rate: Decimal,
    tax_type: String,
    method: String,
    currency: String,
    country: String,
    state: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    product_id: Option<String>,
    customer_id: Option<String>,
    calculated_utc: DateTime<Utc>,
}

impl TaxRow {
    fn into_tax(self, applications: Vec<TaxRuleApplication>) -> Tax {
        Tax {
            tax_id: self.tax_id,
            tenant_id: self.tenant_id,
            amount: round2(self.amount),
            taxable_amount: round2(self.taxable_amount),
            tax_amount: round2(self.tax_amount),
            total_amount: round2(self.total_amount),
            tax_rate: round2(self.tax_rate),
            tax_type: TaxType::from_string(&self.tax_type),
            method: TaxMethod::from_string(&self.method),
            currency: self.currency,
            country: self.country,
            state: self.state,
            city: self.city,
            postal_code: self.postal_code,
            product_id: self.product_id,
            customer_id: self.customer_id,
            calculated_utc: self.calculated_utc,
            applications,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaxRuleApplicationRow {
    application_id: Uuid,
    tax_id: Uuid,
    sequence: i32,
    rule_id: Uuid,
    rule_code: String,
    rule_name: String,
    tax_type: String,
    is_compound: bool,
    priority: i32,
    rate: Decimal,
    taxable_amount: Decimal,
    tax_amount: Decimal,
}

impl From<TaxRuleApplicationRow> for TaxRuleApplication {
    fn from(row: TaxRuleApplicationRow) -> Self {
        Self {
            application_id: row.application_id,
            tax_id: row.tax_id,
            sequence: row.sequence,
            rule_id: row.rule_id,
            rule_code: row.rule_code,
            rule_name: row.rule_name,
            tax_type: TaxType::from_string(&row.tax_type),
            is_compound: row.is_compound,
            priority: row.priority,
            rate: row.rate.normalize(),
            taxable_amount: round2(row.taxable_amount),
            tax_amount: round2(row.tax_amount),
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryTotalsRow {
    calculation_count: i64,
    total_taxable_amount: Decimal,
    total_tax_amount: Decimal,
}

#[derive(Debug, FromRow)]
struct RuleSummaryRow {
    rule_id: Uuid,
    rule_code: String,
    applications: i64,
    tax_amount: Decimal,
}

fn map_rule_write_error(e: sqlx::Error, code: &str, action: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            TaxError::RuleCodeExists(code.to_string()).into()
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e)),
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "tax-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn applications_for(
        &self,
        tax_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<TaxRuleApplication>>, AppError> {
        let rows = sqlx::query_as::<_, TaxRuleApplicationRow>(&format!(
            "SELECT {} FROM tax_rule_applications WHERE tax_id = ANY($1) ORDER BY tax_id, sequence",
            APPLICATION_COLUMNS
        ))
        .bind(tax_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch rule applications: {}", e))
        })?;

        let mut grouped: HashMap<Uuid, Vec<TaxRuleApplication>> = HashMap::new();
        for row in rows {
            grouped.entry(row.tax_id).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

#[async_trait]
impl TaxRuleStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, query), fields(tenant_id = %tenant_id))]
    async fn find_candidate_rules(
        &self,
        tenant_id: Uuid,
        query: &CandidateRuleQuery,
    ) -> Result<Vec<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_candidate_rules"])
            .start_timer();

        let rows = sqlx::query_as::<_, TaxRuleRow>(&format!(
            r#"
            SELECT {}
            FROM tax_rules
            WHERE tenant_id = $1
              AND status = 'active'
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_to IS NULL OR valid_to >= $2)
              AND (min_amount IS NULL OR min_amount <= $3)
              AND (max_amount IS NULL OR max_amount >= $3)
            ORDER BY priority DESC, created_utc ASC
            "#,
            RULE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(query.date)
        .bind(query.amount)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch candidate rules: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows.into_iter().map(TaxRule::from).collect())
    }

    #[instrument(skip(self, rule), fields(tenant_id = %rule.tenant_id, code = %rule.code))]
    async fn create_rule(&self, rule: &TaxRule) -> Result<TaxRule, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_rule"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRuleRow>(&format!(
            r#"
            INSERT INTO tax_rules (rule_id, tenant_id, code, name, description, rule_type, tax_type, status, rate, method, is_compound, is_inclusive, countries, states, cities, postal_codes, product_ids, category_ids, customer_ids, customer_groups, min_amount, max_amount, valid_from, valid_to, priority, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(rule.rule_id)
        .bind(rule.tenant_id)
        .bind(&rule.code)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type.as_str())
        .bind(rule.tax_type.as_str())
        .bind(rule.status.as_str())
        .bind(rule.rate)
        .bind(rule.method.as_str())
        .bind(rule.is_compound)
        .bind(rule.is_inclusive)
        .bind(&rule.countries)
        .bind(&rule.states)
        .bind(&rule.cities)
        .bind(&rule.postal_codes)
        .bind(&rule.product_ids)
        .bind(&rule.category_ids)
        .bind(&rule.customer_ids)
        .bind(&rule.customer_groups)
        .bind(rule.min_amount)
        .bind(rule.max_amount)
        .bind(rule.valid_from)
        .bind(rule.valid_to)
        .bind(rule.priority)
        .bind(rule.created_utc)
        .bind(rule.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_rule_write_error(e, &rule.code, "create tax rule"))?;

        timer.observe_duration();
        info!(rule_id = %row.rule_id, code = %row.code, "Tax rule created");

        Ok(row.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    async fn get_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Option<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_rule"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRuleRow>(&format!(
            "SELECT {} FROM tax_rules WHERE tenant_id = $1 AND rule_id = $2",
            RULE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tax rule: {}", e)))?;

        timer.observe_duration();
        Ok(row.map(TaxRule::from))
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    async fn list_rules(
        &self,
        tenant_id: Uuid,
        filter: &ListTaxRulesFilter,
    ) -> Result<Vec<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rules"])
            .start_timer();

        let page_size = if filter.page_size > 0 {
            filter.page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let limit = page_size.clamp(1, 100) as i64;

        let rows = sqlx::query_as::<_, TaxRuleRow>(&format!(
            r#"
            SELECT {}
            FROM tax_rules
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::varchar IS NULL OR rule_type = $3)
              AND ($4::bool = TRUE OR status <> 'archived')
              AND ($5::uuid IS NULL OR rule_id > $5)
            ORDER BY rule_id
            LIMIT $6
            "#,
            RULE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.rule_type.map(|t| t.as_str()))
        .bind(filter.include_archived || filter.status == Some(RuleStatus::Archived))
        .bind(filter.page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tax rules: {}", e)))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(TaxRule::from).collect())
    }

    #[instrument(skip(self, rule), fields(tenant_id = %rule.tenant_id, rule_id = %rule.rule_id))]
    async fn update_rule(&self, rule: &TaxRule) -> Result<Option<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_rule"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRuleRow>(&format!(
            r#"
            UPDATE tax_rules
            SET code = $3, name = $4, description = $5, rule_type = $6, tax_type = $7, status = $8,
                rate = $9, method = $10, is_compound = $11, is_inclusive = $12,
                countries = $13, states = $14, cities = $15, postal_codes = $16,
                product_ids = $17, category_ids = $18, customer_ids = $19, customer_groups = $20,
                min_amount = $21, max_amount = $22, valid_from = $23, valid_to = $24,
                priority = $25, updated_utc = $26
            WHERE tenant_id = $1 AND rule_id = $2
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(rule.tenant_id)
        .bind(rule.rule_id)
        .bind(&rule.code)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type.as_str())
        .bind(rule.tax_type.as_str())
        .bind(rule.status.as_str())
        .bind(rule.rate)
        .bind(rule.method.as_str())
        .bind(rule.is_compound)
        .bind(rule.is_inclusive)
        .bind(&rule.countries)
        .bind(&rule.states)
        .bind(&rule.cities)
        .bind(&rule.postal_codes)
        .bind(&rule.product_ids)
        .bind(&rule.category_ids)
        .bind(&rule.customer_ids)
        .bind(&rule.customer_groups)
        .bind(rule.min_amount)
        .bind(rule.max_amount)
        .bind(rule.valid_from)
        .bind(rule.valid_to)
        .bind(rule.priority)
        .bind(rule.updated_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_rule_write_error(e, &rule.code, "update tax rule"))?;

        timer.observe_duration();

        if let Some(ref row) = row {
            info!(rule_id = %row.rule_id, code = %row.code, "Tax rule updated");
        }

        Ok(row.map(TaxRule::from))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    async fn archive_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TaxRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["archive_rule"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRuleRow>(&format!(
            r#"
            UPDATE tax_rules
            SET status = 'archived', updated_utc = $3
            WHERE tenant_id = $1 AND rule_id = $2
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(rule_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to archive tax rule: {}", e))
        })?;

        timer.observe_duration();

        if row.is_some() {
            info!("Tax rule archived");
        }

        Ok(row.map(TaxRule::from))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn code_exists(
        &self,
        tenant_id: Uuid,
        code: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["code_exists"])
            .start_timer();

        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM tax_rules
                WHERE tenant_id = $1 AND code = $2 AND ($3::uuid IS NULL OR rule_id <> $3)
            )
            "#,
        )
        .bind(tenant_id)
        .bind(code)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check rule code: {}", e))
        })?;

        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self, rate), fields(tenant_id = %rate.tenant_id, rule_id = %rate.rule_id))]
    async fn create_rate(&self, rate: &TaxRate) -> Result<TaxRate, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_rate"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRateRow>(&format!(
            r#"
            INSERT INTO tax_rates (rate_id, tenant_id, rule_id, country, state, city, postal_code, rate, valid_from, valid_to, is_active, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            RATE_COLUMNS
        ))
        .bind(rate.rate_id)
        .bind(rate.tenant_id)
        .bind(rate.rule_id)
        .bind(&rate.country)
        .bind(&rate.state)
        .bind(&rate.city)
        .bind(&rate.postal_code)
        .bind(rate.rate)
        .bind(rate.valid_from)
        .bind(rate.valid_to)
        .bind(rate.is_active)
        .bind(rate.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create tax rate: {}", e)))?;

        timer.observe_duration();
        info!(rate_id = %row.rate_id, "Tax rate created");

        Ok(row.into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    async fn list_rates(&self, tenant_id: Uuid, rule_id: Uuid) -> Result<Vec<TaxRate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rates"])
            .start_timer();

        let rows = sqlx::query_as::<_, TaxRateRow>(&format!(
            "SELECT {} FROM tax_rates WHERE tenant_id = $1 AND rule_id = $2 ORDER BY created_utc, rate_id",
            RATE_COLUMNS
        ))
        .bind(tenant_id)
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tax rates: {}", e)))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(TaxRate::from).collect())
    }

    #[instrument(skip(self, rate_ids), fields(tenant_id = %tenant_id, count = rate_ids.len()))]
    async fn deactivate_rates(&self, tenant_id: Uuid, rate_ids: &[Uuid]) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_rates"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE tax_rates
            SET is_active = FALSE
            WHERE tenant_id = $1 AND rate_id = ANY($2) AND is_active = TRUE
            "#,
        )
        .bind(tenant_id)
        .bind(rate_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate tax rates: {}", e))
        })?;

        timer.observe_duration();
        info!(deactivated = result.rows_affected(), "Tax rates deactivated");

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CalculationRecorder for Database {
    #[instrument(skip(self, tax), fields(tenant_id = %tax.tenant_id, tax_id = %tax.tax_id))]
    async fn record_calculation(&self, tax: &Tax) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_calculation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO taxes (tax_id, tenant_id, amount, taxable_amount, tax_amount, total_amount, tax_rate, tax_type, method, currency, country, state, city, postal_code, product_id, customer_id, calculated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(tax.tax_id)
        .bind(tax.tenant_id)
        .bind(tax.amount)
        .bind(tax.taxable_amount)
        .bind(tax.tax_amount)
        .bind(tax.total_amount)
        .bind(tax.tax_rate)
        .bind(tax.tax_type.as_str())
        .bind(tax.method.as_str())
        .bind(&tax.currency)
        .bind(&tax.country)
        .bind(&tax.state)
        .bind(&tax.city)
        .bind(&tax.postal_code)
        .bind(&tax.product_id)
        .bind(&tax.customer_id)
        .bind(tax.calculated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert tax: {}", e)))?;

        for application in &tax.applications {
            sqlx::query(
                r#"
                INSERT INTO tax_rule_applications (application_id, tax_id, tenant_id, sequence, rule_id, rule_code, rule_name, tax_type, is_compound, priority, rate, taxable_amount, tax_amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(application.application_id)
            .bind(tax.tax_id)
            .bind(tax.tenant_id)
            .bind(application.sequence)
            .bind(application.rule_id)
            .bind(&application.rule_code)
            .bind(&application.rule_name)
            .bind(application.tax_type.as_str())
            .bind(application.is_compound)
            .bind(application.priority)
            .bind(application.rate)
            .bind(application.taxable_amount)
            .bind(application.tax_amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert rule application: {}",
                    e
                ))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            applications = tax.applications.len(),
            tax_amount = %tax.tax_amount,
            "Tax calculation recorded"
        );

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, tax_id = %tax_id))]
    async fn get_calculation(
        &self,
        tenant_id: Uuid,
        tax_id: Uuid,
    ) -> Result<Option<Tax>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_calculation"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRow>(&format!(
            "SELECT {} FROM taxes WHERE tenant_id = $1 AND tax_id = $2",
            TAX_COLUMNS
        ))
        .bind(tenant_id)
        .bind(tax_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get calculation: {}", e))
        })?;

        let Some(row) = row else {
            timer.observe_duration();
            return Ok(None);
        };

        let mut applications = self.applications_for(&[row.tax_id]).await?;
        let tax = row.into_tax(applications.remove(&tax_id).unwrap_or_default());

        timer.observe_duration();
        Ok(Some(tax))
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    async fn list_calculations(
        &self,
        tenant_id: Uuid,
        filter: &ListCalculationsFilter,
    ) -> Result<Vec<Tax>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_calculations"])
            .start_timer();

        let limit = filter.limit.clamp(1, 100) as i64;

        let rows = sqlx::query_as::<_, TaxRow>(&format!(
            r#"
            SELECT {}
            FROM taxes
            WHERE tenant_id = $1
              AND ($2::timestamptz IS NULL OR calculated_utc >= $2)
              AND ($3::timestamptz IS NULL OR calculated_utc <= $3)
            ORDER BY calculated_utc DESC, tax_id
            LIMIT $4
            "#,
            TAX_COLUMNS
        ))
        .bind(tenant_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list calculations: {}", e))
        })?;

        let tax_ids: Vec<Uuid> = rows.iter().map(|row| row.tax_id).collect();
        let mut applications = self.applications_for(&tax_ids).await?;

        let taxes = rows
            .into_iter()
            .map(|row| {
                let entries = applications.remove(&row.tax_id).unwrap_or_default();
                row.into_tax(entries)
            })
            .collect();

        timer.observe_duration();
        Ok(taxes)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn summarize(
        &self,
        tenant_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<TaxSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["summarize"])
            .start_timer();

        let totals = sqlx::query_as::<_, SummaryTotalsRow>(
            r#"
            SELECT COUNT(*) AS calculation_count,
                   COALESCE(SUM(taxable_amount), 0) AS total_taxable_amount,
                   COALESCE(SUM(tax_amount), 0) AS total_tax_amount
            FROM taxes
            WHERE tenant_id = $1
              AND ($2::timestamptz IS NULL OR calculated_utc >= $2)
              AND ($3::timestamptz IS NULL OR calculated_utc <= $3)
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to summarize calculations: {}", e))
        })?;

        let rules = sqlx::query_as::<_, RuleSummaryRow>(
            r#"
            SELECT a.rule_id,
                   (ARRAY_AGG(a.rule_code ORDER BY t.calculated_utc DESC))[1] AS rule_code,
                   COUNT(*) AS applications,
                   COALESCE(SUM(a.tax_amount), 0) AS tax_amount
            FROM tax_rule_applications a
            JOIN taxes t ON t.tax_id = a.tax_id
            WHERE t.tenant_id = $1
              AND ($2::timestamptz IS NULL OR t.calculated_utc >= $2)
              AND ($3::timestamptz IS NULL OR t.calculated_utc <= $3)
            GROUP BY a.rule_id
            ORDER BY tax_amount DESC, a.rule_id
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to summarize rule usage: {}", e))
        })?;

        timer.observe_duration();

        Ok(TaxSummary {
            calculation_count: totals.calculation_count,
            total_taxable_amount: round2(totals.total_taxable_amount),
            total_tax_amount: round2(totals.total_tax_amount),
            rules: rules
                .into_iter()
                .map(|row| RuleTaxSummary {
                    rule_id: row.rule_id,
                    rule_code: row.rule_code,
                    applications: row.applications,
                    tax_amount: round2(row.tax_amount),
                })
                .collect(),
        })
    }
}
