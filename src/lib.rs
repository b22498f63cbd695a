//! Atelier API Library
//!
//! Backend for boutique retail management: point-of-sale, the stock ledger,
//! production orders, and inventory analytics. Every stock mutation flows
//! through the ledger service, which pairs it with an immutable movement
//! record inside one database transaction.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub search: Option<String>,
}

pub(crate) fn default_page() -> u64 {
    1
}
pub(crate) fn default_limit() -> u64 {
    20
}

// Common response wrapper for paginated listings
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, query: &ListQuery) -> Self {
        Self {
            items,
            total,
            page: query.page,
            limit: query.limit,
        }
    }
}

/// Assembles the full application router with shared middleware layers.
pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(handlers::products::router())
        .merge(handlers::customers::router())
        .merge(handlers::sales::router())
        .merge(handlers::production_orders::router())
        .merge(handlers::inventory::router());

    Router::new()
        .nest("/api/v1", api)
        .merge(handlers::health::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .with_state(state)
}
