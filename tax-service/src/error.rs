//! Domain errors for tax-service.

use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the tax engine and rule lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxError {
    #[error("Amount must be zero or greater")]
    InvalidAmount,

    #[error("Country must be a 2-letter code, got '{0}'")]
    InvalidLocation(String),

    #[error("Unsupported tax method '{0}', expected inclusive or exclusive")]
    InvalidMethod(String),

    #[error("No applicable tax rules for {0}")]
    NoApplicableRules(String),

    #[error("Tax rule {0} is active and cannot be deleted")]
    CannotDeleteRule(Uuid),

    #[error("Tax rule code '{0}' already exists")]
    RuleCodeExists(String),

    #[error("Invalid tax rule: {0}")]
    InvalidRule(String),

    #[error("Tax rule {0} not found")]
    RuleNotFound(Uuid),

    #[error("Calculation exceeds the supported decimal range")]
    AmountOutOfRange,
}

impl TaxError {
    /// Stable machine-readable code returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            TaxError::InvalidAmount => "INVALID_AMOUNT",
            TaxError::InvalidLocation(_) => "INVALID_LOCATION",
            TaxError::InvalidMethod(_) => "INVALID_METHOD",
            TaxError::NoApplicableRules(_) => "NO_APPLICABLE_RULES",
            TaxError::CannotDeleteRule(_) => "CANNOT_DELETE_RULE",
            TaxError::RuleCodeExists(_) => "RULE_CODE_EXISTS",
            TaxError::InvalidRule(_) => "INVALID_RULE",
            TaxError::RuleNotFound(_) => "RULE_NOT_FOUND",
            TaxError::AmountOutOfRange => "AMOUNT_OUT_OF_RANGE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TaxError::RuleCodeExists(_) => StatusCode::CONFLICT,
            TaxError::RuleNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<TaxError> for AppError {
    fn from(err: TaxError) -> Self {
        AppError::Domain {
            status: err.status(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_and_business_errors_are_client_errors() {
        for err in [
            TaxError::InvalidAmount,
            TaxError::InvalidLocation("USA".to_string()),
            TaxError::InvalidMethod("gross".to_string()),
            TaxError::NoApplicableRules("US".to_string()),
            TaxError::CannotDeleteRule(Uuid::nil()),
            TaxError::InvalidRule("rate must not be negative".to_string()),
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{}", err.code());
        }
    }

    #[test]
    fn duplicate_code_maps_to_conflict() {
        let app_err = AppError::from(TaxError::RuleCodeExists("VAT".to_string()));
        assert_eq!(app_err.status(), StatusCode::CONFLICT);
        assert_eq!(app_err.kind(), "RULE_CODE_EXISTS");
    }
}
