use crate::dtos::{
    CreateTaxRateRequest, DeactivateRatesRequest, DeactivateRatesResponse, RateListParams,
    TaxRateResponse,
};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
pub async fn create_rate(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CreateTaxRateRequest>,
) -> Result<(StatusCode, Json<TaxRateResponse>), AppError> {
    request.validate()?;

    let rate = state
        .tax
        .create_rate(request.into_input(tenant_id, rule_id))
        .await?;

    Ok((StatusCode::CREATED, Json(rate.into())))
}

#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
pub async fn list_rates(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<RateListParams>,
) -> Result<Json<Vec<TaxRateResponse>>, AppError> {
    let rates = state
        .tax
        .list_rates(tenant_id, rule_id, params.into_scope(Utc::now()))
        .await?;

    Ok(Json(rates.into_iter().map(TaxRateResponse::from).collect()))
}

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id))]
pub async fn deactivate_rates(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<DeactivateRatesRequest>,
) -> Result<Json<DeactivateRatesResponse>, AppError> {
    request.validate()?;

    let deactivated = state
        .tax
        .deactivate_rates(tenant_id, &request.rate_ids)
        .await?;

    tracing::info!(requested = request.rate_ids.len(), deactivated, "Tax rates deactivated");
    Ok(Json(DeactivateRatesResponse { deactivated }))
}
