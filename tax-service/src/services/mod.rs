//! Services module for tax-service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;
pub mod tax;

pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_calculation, record_calculation_duration, record_error,
    record_rate_operation, record_rule_operation, record_tax_amount,
};
pub use store::{CalculationRecorder, TaxRuleStore};
pub use tax::{CommittedCalculation, TaxService};
