use crate::{
    errors::ServiceError,
    services::catalog::CreateProductInput,
    AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route("/products/:id", get(get_product))
        .route("/variants/:id", delete(deactivate_variant))
        .route("/variants/barcode/:barcode", get(find_variant_by_barcode))
        .route("/sizes", post(create_size).get(list_sizes))
        .route("/colors", post(create_color).get(list_colors))
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.catalog.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (products, total) = state
        .services
        .catalog
        .list_products(query.include_inactive, query.page, query.limit)
        .await?;

    Ok(Json(PaginatedResponse {
        items: products,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(product))
}

async fn deactivate_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state.services.catalog.deactivate_variant(id).await?;
    Ok(Json(variant))
}

async fn find_variant_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state
        .services
        .catalog
        .find_variant_by_barcode(&barcode)
        .await?;
    Ok(Json(variant))
}

async fn create_size(
    State(state): State<AppState>,
    Json(payload): Json<NameRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let size = state.services.catalog.create_size(payload.name).await?;
    Ok((StatusCode::CREATED, Json(size)))
}

async fn list_sizes(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.catalog.list_sizes().await?))
}

async fn create_color(
    State(state): State<AppState>,
    Json(payload): Json<NameRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let color = state.services.catalog.create_color(payload.name).await?;
    Ok((StatusCode::CREATED, Json(color)))
}

async fn list_colors(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.services.catalog.list_colors().await?))
}
