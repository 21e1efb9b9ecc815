//! HTTP handlers for tax-service.

pub mod calculation;
pub mod health;
pub mod history;
pub mod rates;
pub mod rules;

pub use calculation::{applicable_rules, calculate_tax, preview_tax};
pub use health::{health_check, metrics_handler, readiness_check};
pub use history::{get_calculation, list_calculations, tax_summary};
pub use rates::{create_rate, deactivate_rates, list_rates};
pub use rules::{create_rule, delete_rule, get_rule, list_rules, update_rule};
