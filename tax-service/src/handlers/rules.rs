use crate::dtos::{
    CreateTaxRuleRequest, ListRulesParams, ListRulesResponse, TaxRuleResponse,
    UpdateTaxRuleRequest,
};
use crate::services::store::DEFAULT_PAGE_SIZE;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id))]
pub async fn create_rule(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<CreateTaxRuleRequest>,
) -> Result<(StatusCode, Json<TaxRuleResponse>), AppError> {
    request.validate()?;

    let rule = state.tax.create_rule(request.into_input(tenant_id)).await?;

    tracing::info!(rule_id = %rule.rule_id, code = %rule.code, "Tax rule created");
    Ok((StatusCode::CREATED, Json(rule.into())))
}

#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant_id))]
pub async fn list_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(params): Query<ListRulesParams>,
) -> Result<Json<ListRulesResponse>, AppError> {
    let filter = params.into_filter()?;
    let page_size = if filter.page_size > 0 {
        filter.page_size.clamp(1, 100)
    } else {
        DEFAULT_PAGE_SIZE
    };

    let rules = state.tax.list_rules(tenant_id, &filter).await?;

    let next_page_token = if rules.len() == page_size as usize {
        rules.last().map(|rule| rule.rule_id)
    } else {
        None
    };

    Ok(Json(ListRulesResponse {
        rules: rules.into_iter().map(TaxRuleResponse::from).collect(),
        next_page_token,
    }))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
pub async fn get_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TaxRuleResponse>, AppError> {
    let rule = state.tax.get_rule(tenant_id, rule_id).await?;
    Ok(Json(rule.into()))
}

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
pub async fn update_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateTaxRuleRequest>,
) -> Result<Json<TaxRuleResponse>, AppError> {
    request.validate()?;

    let rule = state
        .tax
        .update_rule(tenant_id, rule_id, request.into())
        .await?;

    tracing::info!(code = %rule.code, status = rule.status.as_str(), "Tax rule updated");
    Ok(Json(rule.into()))
}

/// Archives the rule. Active rules are rejected.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
pub async fn delete_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.tax.delete_rule(tenant_id, rule_id).await?;
    tracing::info!("Tax rule archived");
    Ok(StatusCode::NO_CONTENT)
}
