//! Rule applicability predicates.
//!
//! These are the authoritative selection logic. Rule stores only pre-filter,
//! so every candidate passes through [`TaxRule::is_applicable`] before use.

use super::TaxQuery;
use crate::models::{Location, RuleStatus, TaxRule};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

impl TaxRule {
    /// All selection conditions for one calculation request.
    pub fn is_applicable(&self, query: &TaxQuery) -> bool {
        self.status == RuleStatus::Active
            && self.is_valid_for_date(query.date)
            && self.is_valid_for_amount(query.amount)
            && self.is_valid_for_location(&query.location)
            && self.is_valid_for_product(query.product_id.as_deref(), query.category_ids.as_deref())
            && self.is_valid_for_customer(
                query.customer_id.as_deref(),
                query.customer_groups.as_deref(),
            )
    }

    /// `date` within `[valid_from, valid_to]`; a missing bound is open.
    pub fn is_valid_for_date(&self, date: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| date >= from)
            && self.valid_to.map_or(true, |to| date <= to)
    }

    /// `amount` within `[min_amount, max_amount]`; a missing bound is open.
    pub fn is_valid_for_amount(&self, amount: Decimal) -> bool {
        self.min_amount.map_or(true, |min| amount >= min)
            && self.max_amount.map_or(true, |max| amount <= max)
    }

    /// Country, state, city and postal code, each compared case-insensitively.
    pub fn is_valid_for_location(&self, location: &Location) -> bool {
        scope_contains_ci(&self.countries, Some(location.country.as_str()))
            && scope_contains_ci(&self.states, location.state.as_deref())
            && scope_contains_ci(&self.cities, location.city.as_deref())
            && scope_contains_ci(&self.postal_codes, location.postal_code.as_deref())
    }

    /// Product scope.
    ///
    /// With `category_ids == None` only `product_ids` is consulted. When
    /// categories are supplied, a rule scoped by products and/or categories
    /// matches if either the product id or any category id is listed.
    pub fn is_valid_for_product(
        &self,
        product_id: Option<&str>,
        category_ids: Option<&[String]>,
    ) -> bool {
        scope_matches(&self.product_ids, product_id, &self.category_ids, category_ids)
    }

    /// Customer scope, mirroring [`TaxRule::is_valid_for_product`] with customer groups.
    pub fn is_valid_for_customer(
        &self,
        customer_id: Option<&str>,
        customer_groups: Option<&[String]>,
    ) -> bool {
        scope_matches(
            &self.customer_ids,
            customer_id,
            &self.customer_groups,
            customer_groups,
        )
    }
}

fn scope_contains_ci(scope: &[String], value: Option<&str>) -> bool {
    if scope.is_empty() {
        return true;
    }
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    let value = value.to_lowercase();
    scope.iter().any(|entry| entry.trim().to_lowercase() == value)
}

fn scope_matches(
    ids: &[String],
    id: Option<&str>,
    groups: &[String],
    requested_groups: Option<&[String]>,
) -> bool {
    let Some(requested_groups) = requested_groups else {
        return ids.is_empty() || id.is_some_and(|id| ids.iter().any(|entry| entry == id));
    };

    if ids.is_empty() && groups.is_empty() {
        return true;
    }

    let id_listed = id.is_some_and(|id| ids.iter().any(|entry| entry == id));
    let group_listed = requested_groups
        .iter()
        .any(|group| groups.iter().any(|entry| entry == group));

    id_listed || group_listed
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::{query, rule};
    use crate::models::{Location, RuleStatus};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    #[test]
    fn empty_scopes_match_everything() {
        let rule = rule("GLOBAL", 10, 0);
        assert!(rule.is_applicable(&query(Decimal::from(100), "FR")));
    }

    #[test]
    fn inactive_and_archived_rules_never_apply() {
        for status in [RuleStatus::Inactive, RuleStatus::Archived] {
            let mut rule = rule("OFF", 10, 0);
            rule.status = status;
            assert!(!rule.is_applicable(&query(Decimal::from(100), "US")));
        }
    }

    #[test]
    fn country_match_is_case_insensitive() {
        let mut rule = rule("US", 10, 0);
        rule.countries = vec!["us".to_string()];
        assert!(rule.is_applicable(&query(Decimal::from(100), "US")));
        assert!(!rule.is_applicable(&query(Decimal::from(100), "CA")));
    }

    #[test]
    fn state_scope_requires_request_state() {
        let mut rule = rule("CA", 10, 0);
        rule.states = vec!["California".to_string()];

        let mut q = query(Decimal::from(100), "US");
        assert!(!rule.is_valid_for_location(&q.location));

        q.location.state = Some("CALIFORNIA".to_string());
        assert!(rule.is_valid_for_location(&q.location));
    }

    #[test]
    fn postal_code_scope_is_checked_at_rule_level() {
        let mut rule = rule("SF", 10, 0);
        rule.postal_codes = vec!["94105".to_string()];

        let location = Location {
            country: "US".to_string(),
            state: None,
            city: None,
            postal_code: Some("10001".to_string()),
        };
        assert!(!rule.is_valid_for_location(&location));

        let location = Location {
            postal_code: Some("94105".to_string()),
            ..location
        };
        assert!(rule.is_valid_for_location(&location));
    }

    #[test]
    fn amount_bounds_are_inclusive() {
        let mut rule = rule("BAND", 10, 0);
        rule.min_amount = Some(Decimal::from(50));
        rule.max_amount = Some(Decimal::from(100));

        assert!(rule.is_valid_for_amount(Decimal::from(50)));
        assert!(rule.is_valid_for_amount(Decimal::from(100)));
        assert!(!rule.is_valid_for_amount(Decimal::new(4999, 2)));
        assert!(!rule.is_valid_for_amount(Decimal::new(10001, 2)));
    }

    #[test]
    fn validity_window_is_inclusive_and_open_ended() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut rule = rule("WINDOW", 10, 0);
        rule.valid_from = Some(start);

        assert!(rule.is_valid_for_date(start));
        assert!(rule.is_valid_for_date(start + Duration::days(3650)));
        assert!(!rule.is_valid_for_date(start - Duration::seconds(1)));

        rule.valid_to = Some(start + Duration::days(30));
        assert!(!rule.is_valid_for_date(start + Duration::days(31)));
    }

    #[test]
    fn product_scope_without_categories_uses_ids_only() {
        let mut rule = rule("SHOES", 10, 0);
        rule.category_ids = vec!["footwear".to_string()];

        // Category scope is not evaluated when the request carries no categories.
        assert!(rule.is_valid_for_product(Some("sku-1"), None));

        rule.product_ids = vec!["sku-2".to_string()];
        assert!(!rule.is_valid_for_product(Some("sku-1"), None));
        assert!(!rule.is_valid_for_product(None, None));
        assert!(rule.is_valid_for_product(Some("sku-2"), None));
    }

    #[test]
    fn product_scope_with_categories_matches_either_list() {
        let mut rule = rule("SHOES", 10, 0);
        rule.category_ids = vec!["footwear".to_string()];

        let footwear = vec!["footwear".to_string()];
        let books = vec!["books".to_string()];
        assert!(rule.is_valid_for_product(Some("sku-1"), Some(&footwear)));
        assert!(!rule.is_valid_for_product(Some("sku-1"), Some(&books)));

        rule.product_ids = vec!["sku-1".to_string()];
        assert!(rule.is_valid_for_product(Some("sku-1"), Some(&books)));
    }

    #[test]
    fn customer_scope_honors_groups_when_supplied() {
        let mut rule = rule("WHOLESALE", 10, 0);
        rule.customer_groups = vec!["wholesale".to_string()];

        let retail = vec!["retail".to_string()];
        let wholesale = vec!["wholesale".to_string()];
        assert!(rule.is_valid_for_customer(Some("c-1"), None));
        assert!(!rule.is_valid_for_customer(Some("c-1"), Some(&retail)));
        assert!(rule.is_valid_for_customer(Some("c-1"), Some(&wholesale)));
    }
}
