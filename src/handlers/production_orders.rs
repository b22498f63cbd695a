use crate::{
    entities::transaction::TransactionStatus,
    errors::ServiceError,
    services::production::CreateProductionOrderInput,
    AppState, PaginatedResponse,
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
        .route(
            "/production-orders",
            post(create_production_order).get(list_production_orders),
        )
        .route(
            "/production-orders/:id",
            get(get_production_order).delete(delete_production_order),
        )
        .route(
            "/production-orders/:id/complete",
            post(complete_production_order),
        )
        .route(
            "/production-orders/:id/cancel",
            post(cancel_production_order),
        )
}

#[derive(Debug, Deserialize)]
pub struct ProductionOrderListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteProductionOrderRequest {
    pub completed_by: Uuid,
}

async fn create_production_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductionOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .production
        .create_production_order(payload)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_production_orders(
    State(state): State<AppState>,
    Query(query): Query<ProductionOrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .production
        .list_production_orders(query.status, query.page, query.limit)
        .await?;

    Ok(Json(PaginatedResponse {
        items: orders,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

async fn get_production_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.production.get_production_order(id).await?;
    Ok(Json(order))
}

async fn complete_production_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteProductionOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .production
        .complete_production_order(id, payload.completed_by)
        .await?;
    Ok(Json(order))
}

async fn cancel_production_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .production
        .cancel_production_order(id)
        .await?;
    Ok(Json(order))
}

async fn delete_production_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .production
        .delete_production_order(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
