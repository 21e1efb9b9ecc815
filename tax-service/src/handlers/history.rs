use crate::dtos::{ListCalculationsParams, SummaryParams, TaxRecordResponse, TaxSummaryResponse};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant_id))]
pub async fn list_calculations(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ListCalculationsParams>,
) -> Result<Json<Vec<TaxRecordResponse>>, AppError> {
    let taxes = state
        .tax
        .list_calculations(tenant_id, &params.into())
        .await?;
    Ok(Json(taxes.into_iter().map(TaxRecordResponse::from).collect()))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant_id, tax_id = %tax_id))]
pub async fn get_calculation(
    State(state): State<AppState>,
    Path((tenant_id, tax_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TaxRecordResponse>, AppError> {
    let tax = state.tax.get_calculation(tenant_id, tax_id).await?;
    Ok(Json(tax.into()))
}

#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant_id))]
pub async fn tax_summary(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<TaxSummaryResponse>, AppError> {
    let summary = state
        .tax
        .summarize(tenant_id, params.from, params.to)
        .await?;
    Ok(Json(TaxSummaryResponse::new(summary, params.from, params.to)))
}
