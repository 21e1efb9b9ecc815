//! Application startup and lifecycle management.

use crate::config::TaxServiceConfig;
use crate::engine::TaxEngine;
use crate::handlers;
use crate::services::{
    init_metrics, CalculationRecorder, Database, InMemoryStore, TaxRuleStore, TaxService,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: TaxServiceConfig,
    pub tax: Arc<TaxService>,
}

impl AppState {
    pub fn new(
        config: TaxServiceConfig,
        rules: Arc<dyn TaxRuleStore>,
        recorder: Arc<dyn CalculationRecorder>,
    ) -> Self {
        let engine = TaxEngine::new(config.tax.engine_config());
        Self {
            tax: Arc::new(TaxService::new(rules, recorder, engine)),
            config,
        }
    }
}

/// Full HTTP surface with tracing, metrics, request-id and timeout layers.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.common.request_timeout_secs);

    let tenant_routes = Router::new()
        .route("/tax/calculate", post(handlers::calculate_tax))
        .route("/tax/preview", post(handlers::preview_tax))
        .route("/tax/rules/applicable", post(handlers::applicable_rules))
        .route(
            "/tax/rules",
            post(handlers::create_rule).get(handlers::list_rules),
        )
        .route(
            "/tax/rules/:rule_id",
            get(handlers::get_rule)
                .patch(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        .route(
            "/tax/rules/:rule_id/rates",
            post(handlers::create_rate).get(handlers::list_rates),
        )
        .route("/tax/rates/deactivate", post(handlers::deactivate_rates))
        .route("/tax/calculations", get(handlers::list_calculations))
        .route("/tax/calculations/:tax_id", get(handlers::get_calculation))
        .route("/tax/analytics/summary", get(handlers::tax_summary));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/tenants/:tenant_id", tenant_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span::<axum::body::Body>)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: TaxServiceConfig) -> Result<Self, AppError> {
        init_metrics();

        let state = match config.database.url.as_deref() {
            Some(url) => {
                let db = Database::new(
                    url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                let db = Arc::new(db);
                AppState::new(config.clone(), db.clone(), db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                let store = Arc::new(InMemoryStore::new());
                AppState::new(config.clone(), store.clone(), store)
            }
        };

        let addr = config.common.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Tax service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "tax-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
