//! Tax calculation engine.
//!
//! A pure function of (query, rule snapshot, calculation instant). It performs
//! no I/O and never mutates rules; persistence is the caller's concern.

mod matching;

use crate::error::TaxError;
use crate::models::{Location, TaxMethod, TaxRule, TaxType};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Which rule rates are summed to back tax out of an inclusive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusiveRateBasis {
    /// Every matching rule's `rate`, fixed-amount rules included.
    #[default]
    AllRules,
    /// Only `percentage` rules contribute to the divisor.
    PercentageOnly,
}

impl FromStr for InclusiveRateBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all_rules" => Ok(InclusiveRateBasis::AllRules),
            "percentage_only" => Ok(InclusiveRateBasis::PercentageOnly),
            other => Err(format!(
                "unknown inclusive rate basis '{}', expected all_rules or percentage_only",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub inclusive_rate_basis: InclusiveRateBasis,
}

/// Validated calculation input.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxQuery {
    pub amount: Decimal,
    pub location: Location,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
    /// Only evaluated against rule category scopes when present.
    pub category_ids: Option<Vec<String>>,
    /// Only evaluated against rule customer-group scopes when present.
    pub customer_groups: Option<Vec<String>>,
    pub method: TaxMethod,
    pub date: DateTime<Utc>,
    pub currency: String,
}

impl TaxQuery {
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.amount < Decimal::ZERO {
            return Err(TaxError::InvalidAmount);
        }
        if !is_country_code(&self.location.country) {
            return Err(TaxError::InvalidLocation(self.location.country.clone()));
        }
        Ok(())
    }
}

/// Exactly two ASCII letters.
pub fn is_country_code(country: &str) -> bool {
    country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic())
}

/// One rule's contribution to a calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedRule {
    pub rule_id: Uuid,
    pub code: String,
    pub name: String,
    pub tax_type: TaxType,
    pub is_compound: bool,
    pub priority: i32,
    pub rate: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
}

/// Complete calculation outcome. Monetary fields carry exactly two decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxCalculation {
    pub amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub effective_rate: Decimal,
    pub method: TaxMethod,
    pub currency: String,
    pub location: Location,
    pub applied_rules: Vec<AppliedRule>,
    pub calculated_at: DateTime<Utc>,
}

impl TaxCalculation {
    /// Tax type of the highest-priority applied rule.
    pub fn primary_tax_type(&self) -> TaxType {
        self.applied_rules
            .first()
            .map(|rule| rule.tax_type)
            .unwrap_or(TaxType::Percentage)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaxEngine {
    config: EngineConfig,
}

impl TaxEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Applicable rules, highest priority first. Ties keep their input order.
    pub fn select_rules<'r>(&self, query: &TaxQuery, rules: &'r [TaxRule]) -> Vec<&'r TaxRule> {
        let mut applicable: Vec<&TaxRule> =
            rules.iter().filter(|rule| rule.is_applicable(query)).collect();
        applicable.sort_by(|a, b| b.priority.cmp(&a.priority));
        applicable
    }

    pub fn calculate(
        &self,
        query: &TaxQuery,
        rules: &[TaxRule],
        calculated_at: DateTime<Utc>,
    ) -> Result<TaxCalculation, TaxError> {
        query.validate()?;

        let applicable = self.select_rules(query, rules);
        if applicable.is_empty() {
            return Err(TaxError::NoApplicableRules(query.location.display()));
        }

        let taxable_amount = self.taxable_base(query, &applicable)?;
        let taxable_rounded = round2(taxable_amount);

        let mut total_tax = Decimal::ZERO;
        let mut applied_rules = Vec::with_capacity(applicable.len());

        for rule in applicable {
            let percentage_based = rule.tax_type == TaxType::Percentage;

            let mut rule_tax = if percentage_based {
                percent_of(taxable_amount, rule.rate)?
            } else {
                rule.rate
            };

            if rule.is_compound && total_tax > Decimal::ZERO && percentage_based {
                rule_tax = checked_add(rule_tax, percent_of(total_tax, rule.rate)?)?;
            }

            let rule_tax = round2(rule_tax);
            total_tax = checked_add(total_tax, rule_tax)?;

            applied_rules.push(AppliedRule {
                rule_id: rule.rule_id,
                code: rule.code.clone(),
                name: rule.name.clone(),
                tax_type: rule.tax_type,
                is_compound: rule.is_compound,
                priority: rule.priority,
                rate: rule.rate,
                taxable_amount: taxable_rounded,
                tax_amount: rule_tax,
            });
        }

        let tax_amount = round2(total_tax);
        let total_amount = match query.method {
            TaxMethod::Inclusive => round2(query.amount),
            TaxMethod::Exclusive => round2(checked_add(taxable_amount, tax_amount)?),
        };
        let effective_rate = if taxable_amount > Decimal::ZERO {
            let ratio = tax_amount
                .checked_div(taxable_amount)
                .ok_or(TaxError::AmountOutOfRange)?;
            round2(
                ratio
                    .checked_mul(Decimal::ONE_HUNDRED)
                    .ok_or(TaxError::AmountOutOfRange)?,
            )
        } else {
            round2(Decimal::ZERO)
        };

        Ok(TaxCalculation {
            amount: round2(query.amount),
            taxable_amount: taxable_rounded,
            tax_amount,
            total_amount,
            effective_rate,
            method: query.method,
            currency: query.currency.clone(),
            location: query.location.clone(),
            applied_rules,
            calculated_at,
        })
    }

    /// Amount the rules are applied to, before rounding.
    fn taxable_base(&self, query: &TaxQuery, rules: &[&TaxRule]) -> Result<Decimal, TaxError> {
        if query.method == TaxMethod::Exclusive {
            return Ok(query.amount);
        }

        let mut total_rate = Decimal::ZERO;
        for rule in rules {
            let counted = match self.config.inclusive_rate_basis {
                InclusiveRateBasis::AllRules => true,
                InclusiveRateBasis::PercentageOnly => rule.tax_type == TaxType::Percentage,
            };
            if counted {
                total_rate = checked_add(total_rate, rule.rate)?;
            }
        }

        if total_rate <= Decimal::ZERO {
            return Ok(query.amount);
        }

        let divisor = checked_add(
            Decimal::ONE,
            total_rate
                .checked_div(Decimal::ONE_HUNDRED)
                .ok_or(TaxError::AmountOutOfRange)?,
        )?;
        query
            .amount
            .checked_div(divisor)
            .ok_or(TaxError::AmountOutOfRange)
    }
}

fn percent_of(base: Decimal, rate: Decimal) -> Result<Decimal, TaxError> {
    base.checked_mul(rate)
        .and_then(|value| value.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(TaxError::AmountOutOfRange)
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, TaxError> {
    a.checked_add(b).ok_or(TaxError::AmountOutOfRange)
}

/// Round half away from zero to two places, always carrying scale 2.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{RuleStatus, RuleType};
    use chrono::TimeZone;

    pub(crate) fn rule(code: &str, rate: i64, priority: i32) -> TaxRule {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        TaxRule {
            rule_id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            code: code.to_string(),
            name: format!("{} rule", code),
            description: None,
            rule_type: RuleType::Global,
            tax_type: TaxType::Percentage,
            status: RuleStatus::Active,
            rate: Decimal::from(rate),
            method: TaxMethod::Exclusive,
            is_compound: false,
            is_inclusive: false,
            countries: vec![],
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
            created_utc: created,
            updated_utc: created,
        }
    }

    pub(crate) fn query(amount: Decimal, country: &str) -> TaxQuery {
        TaxQuery {
            amount,
            location: Location {
                country: country.to_string(),
                state: None,
                city: None,
                postal_code: None,
            },
            product_id: None,
            customer_id: None,
            category_ids: None,
            customer_groups: None,
            method: TaxMethod::Exclusive,
            date: Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
            currency: "USD".to_string(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 1).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn single_percentage_rule_exclusive() {
        let mut vat = rule("VAT10", 10, 0);
        vat.countries = vec!["US".to_string()];

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[vat], at())
            .unwrap();

        assert_eq!(result.taxable_amount, dec("100.00"));
        assert_eq!(result.tax_amount, dec("10.00"));
        assert_eq!(result.total_amount, dec("110.00"));
        assert_eq!(result.effective_rate, dec("10.00"));
        assert_eq!(result.applied_rules.len(), 1);
    }

    #[test]
    fn country_mismatch_has_no_applicable_rules() {
        let mut vat = rule("VAT10", 10, 0);
        vat.countries = vec!["US".to_string()];

        let err = TaxEngine::default()
            .calculate(&query(dec("100"), "GB"), &[vat], at())
            .unwrap_err();

        assert_eq!(err, TaxError::NoApplicableRules("GB".to_string()));
    }

    #[test]
    fn fixed_rule_ignores_amount() {
        let mut levy = rule("LEVY", 5, 0);
        levy.tax_type = TaxType::Fixed;

        for amount in ["50", "1000"] {
            let result = TaxEngine::default()
                .calculate(&query(dec(amount), "US"), &[levy.clone()], at())
                .unwrap();
            assert_eq!(result.tax_amount, dec("5.00"));
        }
    }

    #[test]
    fn inclusive_single_rule_backs_out_tax() {
        let mut q = query(dec("110"), "US");
        q.method = TaxMethod::Inclusive;

        let result = TaxEngine::default()
            .calculate(&q, &[rule("VAT10", 10, 0)], at())
            .unwrap();

        assert_eq!(result.taxable_amount, dec("100.00"));
        assert_eq!(result.tax_amount, dec("10.00"));
        assert_eq!(result.total_amount, dec("110.00"));
    }

    #[test]
    fn rules_apply_in_priority_order() {
        let low = rule("LOW", 2, 5);
        let high = rule("HIGH", 8, 10);

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[low, high], at())
            .unwrap();

        assert_eq!(result.applied_rules[0].priority, 10);
        assert_eq!(result.applied_rules[0].tax_amount, dec("8.00"));
        assert_eq!(result.applied_rules[1].tax_amount, dec("2.00"));
        assert_eq!(result.tax_amount, dec("10.00"));
    }

    #[test]
    fn equal_priorities_keep_input_order() {
        let rules = vec![rule("A", 1, 3), rule("B", 1, 7), rule("C", 1, 3)];

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &rules, at())
            .unwrap();

        let codes: Vec<&str> = result.applied_rules.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["B", "A", "C"]);
    }

    #[test]
    fn compound_rule_taxes_accumulated_tax() {
        let base = rule("BASE", 10, 10);
        let mut surcharge = rule("SURCHARGE", 5, 5);
        surcharge.is_compound = true;

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[base, surcharge], at())
            .unwrap();

        assert_eq!(result.applied_rules[1].tax_amount, dec("5.50"));
        assert_eq!(result.tax_amount, dec("15.50"));
        assert_eq!(result.total_amount, dec("115.50"));
    }

    #[test]
    fn compound_flag_on_first_rule_has_nothing_to_compound() {
        let mut first = rule("FIRST", 10, 10);
        first.is_compound = true;

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[first], at())
            .unwrap();

        assert_eq!(result.tax_amount, dec("10.00"));
    }

    #[test]
    fn fixed_compound_rule_adds_no_compound_term() {
        let base = rule("BASE", 10, 10);
        let mut fee = rule("FEE", 3, 5);
        fee.tax_type = TaxType::Fixed;
        fee.is_compound = true;

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[base, fee], at())
            .unwrap();

        assert_eq!(result.applied_rules[1].tax_amount, dec("3.00"));
        assert_eq!(result.tax_amount, dec("13.00"));
    }

    #[test]
    fn compound_tax_type_charges_its_rate_as_an_amount() {
        let mut levy = rule("LEVY", 5, 0);
        levy.tax_type = TaxType::Compound;

        let result = TaxEngine::default()
            .calculate(&query(dec("200"), "US"), &[levy], at())
            .unwrap();

        assert_eq!(result.tax_amount, dec("5.00"));
        assert!(!result.applied_rules[0].is_compound);
    }

    #[test]
    fn compound_tax_type_does_not_compound_without_flag() {
        let base = rule("BASE", 10, 10);
        let mut levy = rule("LEVY", 5, 5);
        levy.tax_type = TaxType::Compound;

        let result = TaxEngine::default()
            .calculate(&query(dec("100"), "US"), &[base, levy], at())
            .unwrap();

        assert_eq!(result.applied_rules[1].tax_amount, dec("5.00"));
        assert_eq!(result.tax_amount, dec("15.00"));
    }

    #[test]
    fn rule_tax_rounds_half_up() {
        let mut odd = rule("ODD", 0, 0);
        odd.rate = dec("7.5");

        // 0.07 * 7.5% = 0.00525 -> 0.01
        let result = TaxEngine::default()
            .calculate(&query(dec("0.07"), "US"), &[odd], at())
            .unwrap();

        assert_eq!(result.tax_amount, dec("0.01"));
        assert_eq!(result.tax_amount.scale(), 2);
    }

    #[test]
    fn inclusive_sum_counts_fixed_rates_by_default() {
        let mut q = query(dec("115"), "US");
        q.method = TaxMethod::Inclusive;
        let pct = rule("PCT", 10, 10);
        let mut fixed = rule("FIXED", 5, 5);
        fixed.tax_type = TaxType::Fixed;

        let result = TaxEngine::default()
            .calculate(&q, &[pct.clone(), fixed.clone()], at())
            .unwrap();
        // 115 / 1.15
        assert_eq!(result.taxable_amount, dec("100.00"));
        assert_eq!(result.total_amount, dec("115.00"));

        let engine = TaxEngine::new(EngineConfig {
            inclusive_rate_basis: InclusiveRateBasis::PercentageOnly,
        });
        let result = engine.calculate(&q, &[pct, fixed], at()).unwrap();
        // 115 / 1.10 = 104.5454...
        assert_eq!(result.taxable_amount, dec("104.55"));
        assert_eq!(result.total_amount, dec("115.00"));
    }

    #[test]
    fn zero_amount_yields_zero_effective_rate() {
        let result = TaxEngine::default()
            .calculate(&query(dec("0"), "US"), &[rule("VAT", 10, 0)], at())
            .unwrap();

        assert_eq!(result.tax_amount, dec("0.00"));
        assert_eq!(result.effective_rate, dec("0.00"));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let rules = [rule("VAT", 10, 0)];

        let err = TaxEngine::default()
            .calculate(&query(dec("-1"), "US"), &rules, at())
            .unwrap_err();
        assert_eq!(err, TaxError::InvalidAmount);

        let err = TaxEngine::default()
            .calculate(&query(dec("10"), "USA"), &rules, at())
            .unwrap_err();
        assert_eq!(err, TaxError::InvalidLocation("USA".to_string()));
    }

    #[test]
    fn same_inputs_give_identical_results() {
        let rules = vec![rule("A", 8, 10), rule("B", 2, 5)];
        let engine = TaxEngine::default();
        let q = query(dec("99.99"), "US");

        let first = engine.calculate(&q, &rules, at()).unwrap();
        let second = engine.calculate(&q, &rules, at()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn outputs_respect_amount_properties() {
        let rules = vec![rule("A", 8, 10), rule("B", 2, 5)];
        let engine = TaxEngine::default();

        for amount in ["0.01", "1", "19.99", "250.50", "10000"] {
            let mut q = query(dec(amount), "US");
            let exclusive = engine.calculate(&q, &rules, at()).unwrap();
            assert!(exclusive.tax_amount >= Decimal::ZERO);
            assert!(exclusive.total_amount >= exclusive.taxable_amount);

            q.method = TaxMethod::Inclusive;
            let inclusive = engine.calculate(&q, &rules, at()).unwrap();
            assert_eq!(inclusive.total_amount, dec(amount));
        }
    }

    #[test]
    fn overflow_is_reported_not_panicked() {
        let mut huge = rule("HUGE", 0, 0);
        huge.rate = Decimal::MAX;

        let err = TaxEngine::default()
            .calculate(&query(Decimal::MAX, "US"), &[huge], at())
            .unwrap_err();
        assert_eq!(err, TaxError::AmountOutOfRange);
    }

    #[test]
    fn round2_pads_scale() {
        assert_eq!(round2(Decimal::from(5)).to_string(), "5.00");
        assert_eq!(round2(dec("2.345")).to_string(), "2.35");
        assert_eq!(round2(dec("2.344")).to_string(), "2.34");
    }
}
