use crate::dtos::{TaxCalculationRequest, TaxCalculationResponse, TaxRuleResponse};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id))]
pub async fn calculate_tax(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<TaxCalculationRequest>,
) -> Result<Json<TaxCalculationResponse>, AppError> {
    request.validate()?;
    let query = request.into_query(Utc::now(), &state.config.tax)?;

    let committed = state.tax.calculate(tenant_id, &query).await?;

    Ok(Json(TaxCalculationResponse::new(
        committed.calculation,
        Some(committed.tax_id),
    )))
}

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id))]
pub async fn preview_tax(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<TaxCalculationRequest>,
) -> Result<Json<TaxCalculationResponse>, AppError> {
    request.validate()?;
    let query = request.into_query(Utc::now(), &state.config.tax)?;

    let calculation = state.tax.preview(tenant_id, &query).await?;

    Ok(Json(TaxCalculationResponse::new(calculation, None)))
}

/// Rules that would apply to the request, highest priority first.
#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id))]
pub async fn applicable_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<TaxCalculationRequest>,
) -> Result<Json<Vec<TaxRuleResponse>>, AppError> {
    request.validate()?;
    let query = request.into_query(Utc::now(), &state.config.tax)?;

    let rules = state.tax.applicable_rules(tenant_id, &query).await?;

    Ok(Json(rules.into_iter().map(TaxRuleResponse::from).collect()))
}
