mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::stock_movement::{self, StockMovementType},
    errors::ServiceError,
    services::analytics::{ReorderPriority, StockStatus, STOCKOUT_SENTINEL_DAYS},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use common::{actor, seed_variant, setup, TestContext};

/// Inserts a raw OUT movement with a controlled timestamp; the analytics
/// engine only reads quantity and created_at from the sample.
async fn seed_out_movement(
    ctx: &TestContext,
    variant_id: Uuid,
    quantity: i32,
    created_at: DateTime<Utc>,
) {
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(variant_id),
        movement_type: Set(StockMovementType::Out),
        quantity: Set(quantity),
        reason: Set("SALE".to_string()),
        reference: Set(None),
        previous_stock: Set(quantity),
        new_stock: Set(0),
        created_by: Set(actor()),
        created_at: Set(created_at),
    };
    movement
        .insert(ctx.db.as_ref())
        .await
        .expect("failed to seed movement");
}

/// 90 units of outbound volume across 10 movements spanning exactly 30 days.
async fn seed_sales_history(ctx: &TestContext, variant_id: Uuid) {
    let base = Utc::now();
    for days_ago in [0i64, 2, 5, 8, 12, 15, 18, 22, 26, 30] {
        seed_out_movement(ctx, variant_id, 9, base - Duration::days(days_ago)).await;
    }
}

#[tokio::test]
async fn stock_health_classifies_and_sorts_by_alert_priority() {
    let ctx = setup().await;
    let critical = seed_variant(&ctx, 0, 10, None, dec!(100)).await;
    let low = seed_variant(&ctx, 5, 10, None, dec!(100)).await;
    let normal = seed_variant(&ctx, 35, 10, None, dec!(100)).await;
    let overstock = seed_variant(&ctx, 55, 10, None, dec!(100)).await;

    let health = ctx.services.analytics.stock_health().await.unwrap();
    assert_eq!(health.len(), 4);

    assert_eq!(health[0].variant_id, critical.variant_id);
    assert_eq!(health[0].status, StockStatus::Critical);
    assert_eq!(health[1].variant_id, low.variant_id);
    assert_eq!(health[1].status, StockStatus::Low);
    assert_eq!(health[2].variant_id, overstock.variant_id);
    assert_eq!(health[2].status, StockStatus::Overstock);
    assert_eq!(health[3].variant_id, normal.variant_id);
    assert_eq!(health[3].status, StockStatus::Normal);

    // The derived ceiling: max(10 * 3, 50)
    assert_eq!(health[0].max_stock, 50);
}

#[tokio::test]
async fn inactive_variants_are_excluded_from_health_and_summary() {
    let ctx = setup().await;
    let active = seed_variant(&ctx, 5, 10, None, dec!(100)).await;
    let retired = seed_variant(&ctx, 0, 10, None, dec!(100)).await;
    ctx.services
        .catalog
        .deactivate_variant(retired.variant_id)
        .await
        .unwrap();

    let health = ctx.services.analytics.stock_health().await.unwrap();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].variant_id, active.variant_id);

    let summary = ctx.services.analytics.summary().await.unwrap();
    assert_eq!(summary.total_variants, 1);
    assert_eq!(summary.low, 1);
    assert_eq!(summary.critical, 0);
    assert_eq!(summary.total_units, 5);
}

#[tokio::test]
async fn reorder_suggestion_math_from_movement_history() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 2, 5, None, dec!(100)).await;
    seed_sales_history(&ctx, seeded.variant_id).await;

    let suggestion = ctx
        .services
        .analytics
        .variant_reorder(seeded.variant_id)
        .await
        .unwrap();

    // 90 units over 30 days: 3 per day; safety = max(3*7, 5) = 21;
    // suggested = max(50 - 2, 21 + 21 - 2) = 48
    assert!((suggestion.avg_daily_sales - 3.0).abs() < 1e-9);
    assert!((suggestion.safety_stock - 21.0).abs() < 1e-9);
    assert_eq!(suggestion.max_stock, 50);
    assert_eq!(suggestion.suggested_quantity, 48);
    assert_eq!(suggestion.days_until_stockout, 0);
    assert_eq!(suggestion.priority, ReorderPriority::High);
}

#[tokio::test]
async fn inbound_movements_do_not_count_toward_velocity() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 10, 5, None, dec!(100)).await;

    // Only inbound history: no measurable outbound velocity
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(seeded.variant_id),
        movement_type: Set(StockMovementType::In),
        quantity: Set(40),
        reason: Set("PRODUCTION".to_string()),
        reference: Set(None),
        previous_stock: Set(0),
        new_stock: Set(40),
        created_by: Set(actor()),
        created_at: Set(Utc::now()),
    };
    movement.insert(ctx.db.as_ref()).await.unwrap();

    let suggestion = ctx
        .services
        .analytics
        .variant_reorder(seeded.variant_id)
        .await
        .unwrap();

    assert_eq!(suggestion.avg_daily_sales, 0.0);
    assert_eq!(suggestion.days_until_stockout, STOCKOUT_SENTINEL_DAYS);
}

#[tokio::test]
async fn suggestions_exclude_well_stocked_variants_and_sort_by_urgency() {
    let ctx = setup().await;
    let empty = seed_variant(&ctx, 0, 5, None, dec!(100)).await;
    let low = seed_variant(&ctx, 2, 5, None, dec!(100)).await;
    // Above its ceiling: nothing to suggest
    let full = seed_variant(&ctx, 60, 5, None, dec!(100)).await;

    seed_sales_history(&ctx, low.variant_id).await;

    let suggestions = ctx.services.analytics.reorder_suggestions().await.unwrap();

    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].variant_id, empty.variant_id);
    assert_eq!(suggestions[0].priority, ReorderPriority::Urgent);
    assert_eq!(suggestions[1].variant_id, low.variant_id);
    assert_eq!(suggestions[1].priority, ReorderPriority::High);
    assert!(!suggestions.iter().any(|s| s.variant_id == full.variant_id));
}

#[tokio::test]
async fn unknown_variant_reorder_is_not_found() {
    let ctx = setup().await;

    let err = ctx
        .services
        .analytics
        .variant_reorder(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
