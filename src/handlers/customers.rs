use crate::{errors::ServiceError, AppState, ListQuery, PaginatedResponse};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", post(upsert_customer).get(list_customers))
        .route("/customers/:id", get(get_customer))
}

#[derive(Debug, Deserialize)]
pub struct UpsertCustomerRequest {
    pub name: String,
    pub phone: Option<String>,
}

async fn upsert_customer(
    State(state): State<AppState>,
    Json(payload): Json<UpsertCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state
        .services
        .customers
        .upsert_by_phone(payload.name, payload.phone)
        .await?;
    Ok(Json(customer))
}

async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (customers, total) = state
        .services
        .customers
        .list_customers(query.search.clone(), query.page, query.limit)
        .await?;

    Ok(Json(PaginatedResponse::new(customers, total, &query)))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.get_customer(id).await?;
    Ok(Json(customer))
}
