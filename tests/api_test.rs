mod common;

use atelier_api::{app_router, config::AppConfig, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{actor, seed_variant, setup, TestContext};

async fn test_app() -> (Router, TestContext) {
    let ctx = setup().await;
    let cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );

    let state = AppState {
        db: ctx.db.clone(),
        config: cfg,
        event_sender: ctx.services_event_sender(),
        services: ctx.services.clone(),
    };

    (app_router(state), ctx)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _ctx) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["status"], "ok");
}

#[tokio::test]
async fn sale_roundtrip_through_the_http_surface() {
    let (app, ctx) = test_app().await;
    let seeded = seed_variant(&ctx, 20, 5, Some(dec!(100)), dec!(100)).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/sales",
            json!({
                "customer": { "kind": "upsert", "name": "Ibu Sari", "phone": "0812000111" },
                "items": [{
                    "variant_id": seeded.variant_id,
                    "quantity": 6,
                    "price_override": null,
                    "substitute_from_variant_id": null
                }],
                "discount": "0",
                "tax_rate": "0",
                "notes": null,
                "created_by": actor()
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = body_json(response).await;
    assert_eq!(payload["transaction"]["total_amount"], "600");
    assert_eq!(payload["transaction"]["status"], "COMPLETED");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/inventory/movements")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["total"], 1);
    assert_eq!(payload["items"][0]["movement_type"], "OUT");
    assert_eq!(payload["items"][0]["quantity"], 6);
}

#[tokio::test]
async fn insufficient_stock_maps_to_422_with_structured_details() {
    let (app, ctx) = test_app().await;
    let seeded = seed_variant(&ctx, 3, 5, Some(dec!(100)), dec!(100)).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/sales",
            json!({
                "customer": { "kind": "upsert", "name": "Ibu Sari", "phone": "0812000111" },
                "items": [{
                    "variant_id": seeded.variant_id,
                    "quantity": 5,
                    "price_override": null,
                    "substitute_from_variant_id": null
                }],
                "discount": "0",
                "tax_rate": "0",
                "notes": null,
                "created_by": actor()
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = body_json(response).await;
    assert_eq!(payload["details"]["available"], 3);
    assert_eq!(payload["details"]["requested"], 5);
}

#[tokio::test]
async fn adjustment_and_analytics_endpoints_respond() {
    let (app, ctx) = test_app().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/inventory/adjustments",
            json!({
                "variant_id": seeded.variant_id,
                "new_stock": 4,
                "reason": "barang rusak",
                "created_by": actor()
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/inventory/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload[0]["status"], "LOW");
    assert_eq!(payload[0]["stock"], 4);
}
