//! Test helper module for tax-service integration tests.
//!
//! Builds the real router over the in-memory store and drives it in-process.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::observability::LogFormat;
use std::sync::Arc;
use tax_service::config::{DatabaseConfig, TaxDefaults, TaxServiceConfig};
use tax_service::services::{init_metrics, InMemoryStore};
use tax_service::startup::{build_router, AppState};
use tower::ServiceExt;

// Test constants for tenant context
pub const TEST_TENANT_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const OTHER_TENANT_ID: &str = "22222222-2222-2222-2222-222222222222";

pub fn test_config() -> TaxServiceConfig {
    TaxServiceConfig {
        common: CoreConfig::default(),
        service_name: "tax-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Json,
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
        },
        tax: TaxDefaults::default(),
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: TaxServiceConfig) -> Self {
        // Initialize metrics (required for metrics endpoint test)
        init_metrics();

        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(config, store.clone(), store);

        TestApp {
            router: build_router(state),
        }
    }

    /// Send a request and return the status with the decoded JSON body
    /// (`Value::Null` when the body is empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("Failed to build request"),
            None => builder.body(Body::empty()).expect("Failed to build request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, value)
    }

    /// Raw response, for endpoints that do not return JSON.
    pub async fn get_raw(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("Failed to build request"),
            )
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Create a rule for the test tenant, panicking unless it returns 201.
    pub async fn create_rule(&self, body: Value) -> Value {
        let (status, rule) = self.post(&tenant_path("/tax/rules"), body).await;
        assert_eq!(status, StatusCode::CREATED, "create rule failed: {}", rule);
        rule
    }
}

/// Path under the test tenant.
pub fn tenant_path(suffix: &str) -> String {
    format!("/tenants/{}{}", TEST_TENANT_ID, suffix)
}

/// Minimal active percentage rule body.
pub fn rule_body(code: &str, rate: &str, priority: i32) -> Value {
    json!({
        "code": code,
        "name": format!("{} rule", code),
        "type": "location",
        "taxType": "percentage",
        "rate": rate,
        "countries": ["US"],
        "priority": priority
    })
}

pub fn us_request(amount: &str) -> Value {
    json!({ "amount": amount, "country": "US" })
}
