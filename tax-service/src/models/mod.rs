//! Domain models for tax-service.

mod calculation;
mod location;
mod rate;
mod rule;

pub use calculation::{
    ListCalculationsFilter, RuleTaxSummary, Tax, TaxRuleApplication, TaxSummary,
};
pub use location::Location;
pub use rate::{CreateTaxRate, TaxRate};
pub use rule::{
    CandidateRuleQuery, CreateTaxRule, ListTaxRulesFilter, RuleStatus, RuleType, TaxMethod,
    TaxRule, TaxType, UpdateTaxRule,
};
