use crate::{
    errors::ServiceError, services::adjustments::StockAdjustmentInput, AppState,
    PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory/adjustments", post(adjust_stock))
        .route("/inventory/movements", get(list_movements))
        .route("/inventory/status", get(stock_health))
        .route("/inventory/reorder-suggestions", get(reorder_suggestions))
        .route(
            "/inventory/reorder-suggestions/:variant_id",
            get(variant_reorder),
        )
        .route("/inventory/summary", get(inventory_summary))
}

#[derive(Debug, Deserialize)]
pub struct MovementListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    pub variant_id: Option<Uuid>,
}

async fn adjust_stock(
    State(state): State<AppState>,
    Json(payload): Json<StockAdjustmentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let entry = state.services.adjustments.adjust_stock(payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (movements, total) = state
        .services
        .stock_ledger
        .list_movements(query.variant_id, query.page, query.limit)
        .await?;

    Ok(Json(PaginatedResponse {
        items: movements,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

async fn stock_health(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.analytics.stock_health().await?))
}

async fn reorder_suggestions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.analytics.reorder_suggestions().await?))
}

async fn variant_reorder(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state.services.analytics.variant_reorder(variant_id).await?,
    ))
}

async fn inventory_summary(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.analytics.summary().await?))
}
