//! HTTP request and response bodies. JSON fields are camelCase.

pub mod calculation;
pub mod history;
pub mod rates;
pub mod rules;

pub use calculation::{AppliedTaxRuleResponse, TaxCalculationRequest, TaxCalculationResponse};
pub use history::{
    ListCalculationsParams, RuleSummaryResponse, SummaryParams, TaxRecordResponse,
    TaxRuleApplicationResponse, TaxSummaryResponse,
};
pub use rates::{
    CreateTaxRateRequest, DeactivateRatesRequest, DeactivateRatesResponse, RateListParams,
    TaxRateResponse,
};
pub use rules::{
    CreateTaxRuleRequest, ListRulesParams, ListRulesResponse, TaxRuleResponse,
    UpdateTaxRuleRequest,
};
