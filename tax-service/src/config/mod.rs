//! Configuration module for tax-service.

use crate::engine::{EngineConfig, InclusiveRateBasis};
use crate::models::TaxMethod;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::observability::LogFormat;
use std::env;

#[derive(Debug, Clone)]
pub struct TaxServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub tax: TaxDefaults,
}

/// Postgres settings. Without a URL the service runs on the in-memory store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TaxDefaults {
    pub default_currency: String,
    /// Used when a calculation request names no method.
    pub default_method: TaxMethod,
    pub inclusive_rate_basis: InclusiveRateBasis,
}

impl Default for TaxDefaults {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_method: TaxMethod::Exclusive,
            inclusive_rate_basis: InclusiveRateBasis::AllRules,
        }
    }
}

impl TaxDefaults {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            inclusive_rate_basis: self.inclusive_rate_basis,
        }
    }
}

impl TaxServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };

        let inclusive_rate_basis = match env::var("TAX_INCLUSIVE_RATE_BASIS") {
            Ok(value) => value
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            Err(_) => InclusiveRateBasis::default(),
        };

        let default_currency = env::var("TAX_DEFAULT_CURRENCY")
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|_| "USD".to_string());
        if default_currency.len() != 3 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TAX_DEFAULT_CURRENCY must be a 3-letter code, got '{}'",
                default_currency
            )));
        }

        let default_method = match env::var("TAX_DEFAULT_METHOD") {
            Ok(value) => value.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!(
                    "TAX_DEFAULT_METHOD must be inclusive or exclusive, got '{}'",
                    value
                ))
            })?,
            Err(_) => TaxMethod::default(),
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "tax-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            tax: TaxDefaults {
                default_currency,
                default_method,
                inclusive_rate_basis,
            },
        })
    }
}
