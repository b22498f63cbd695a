use crate::{
    errors::ServiceError, services::sales::CreateSaleInput, AppState, ListQuery,
    PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sales", post(create_sale).get(list_sales))
        .route("/sales/:id", get(get_sale))
}

async fn create_sale(
    State(state): State<AppState>,
    Json(payload): Json<CreateSaleInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state.services.sales.create_sale(payload).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (sales, total) = state
        .services
        .sales
        .list_sales(query.page, query.limit)
        .await?;

    Ok(Json(PaginatedResponse::new(sales, total, &query)))
}

async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state.services.sales.get_sale(id).await?;
    Ok(Json(sale))
}
