mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::{
        stock_movement::StockMovementType,
        transaction::{Entity as Transaction, TransactionStatus, TransactionType},
        transaction_item::Entity as TransactionItem,
    },
    errors::ServiceError,
    services::production::{CreateProductionOrderInput, ProductionItemInput},
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;

use common::{actor, movements_for, seed_variant, setup, variant_stock};

fn order_input(variant_id: uuid::Uuid, quantity: i32) -> CreateProductionOrderInput {
    CreateProductionOrderInput {
        items: vec![ProductionItemInput {
            variant_id,
            quantity,
            unit_price: dec!(45),
        }],
        notes: Some("batch produksi minggu ini".to_string()),
        created_by: actor(),
    }
}

#[tokio::test]
async fn creation_is_pending_and_leaves_stock_untouched() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let order = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 10))
        .await
        .expect("order should be created");

    assert_eq!(order.transaction.transaction_type, TransactionType::Purchase);
    assert_eq!(order.transaction.status, TransactionStatus::Pending);
    assert_eq!(order.transaction.total_amount, dec!(450));
    assert!(order.transaction.invoice_number.starts_with("PRD-"));
    assert_eq!(order.items.len(), 1);

    // The single-increment invariant: nothing moves until completion
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 20);
    assert!(movements_for(&ctx, seeded.variant_id).await.is_empty());
}

#[tokio::test]
async fn completion_increments_stock_exactly_once() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let order = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 10))
        .await
        .unwrap();

    let completed = ctx
        .services
        .production
        .complete_production_order(order.transaction.id, actor())
        .await
        .expect("completion should succeed");

    assert_eq!(completed.transaction.status, TransactionStatus::Completed);
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 30);

    let movements = movements_for(&ctx, seeded.variant_id).await;
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, StockMovementType::In);
    assert_eq!(movements[0].quantity, 10);
    assert_eq!(movements[0].reason, "PRODUCTION");
    assert_eq!(
        movements[0].reference.as_deref(),
        Some(order.transaction.invoice_number.as_str())
    );

    // Retrying the completion is rejected and changes nothing
    let err = ctx
        .services
        .production
        .complete_production_order(order.transaction.id, actor())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyCompleted(_));
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 30);
    assert_eq!(movements_for(&ctx, seeded.variant_id).await.len(), 1);
}

#[tokio::test]
async fn cancelled_orders_cannot_be_completed() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let order = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 10))
        .await
        .unwrap();

    let cancelled = ctx
        .services
        .production
        .cancel_production_order(order.transaction.id)
        .await
        .unwrap();
    assert_eq!(cancelled.transaction.status, TransactionStatus::Cancelled);

    let err = ctx
        .services
        .production
        .complete_production_order(order.transaction.id, actor())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyCancelled(_));
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 20);

    // Cancelling twice is also rejected
    let err = ctx
        .services
        .production
        .cancel_production_order(order.transaction.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyCancelled(_));
}

#[tokio::test]
async fn pending_orders_can_be_deleted_without_touching_stock() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let order = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 10))
        .await
        .unwrap();

    ctx.services
        .production
        .delete_production_order(order.transaction.id)
        .await
        .expect("pending order should be deletable");

    assert!(Transaction::find()
        .all(ctx.db.as_ref())
        .await
        .unwrap()
        .is_empty());
    assert!(TransactionItem::find()
        .all(ctx.db.as_ref())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 20);
    assert!(movements_for(&ctx, seeded.variant_id).await.is_empty());
}

#[tokio::test]
async fn completed_orders_cannot_be_deleted() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let order = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 10))
        .await
        .unwrap();
    ctx.services
        .production
        .complete_production_order(order.transaction.id, actor())
        .await
        .unwrap();

    let err = ctx
        .services
        .production
        .delete_production_order(order.transaction.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyCompleted(_));

    // The completed stock increment stays in place
    assert_eq!(variant_stock(&ctx, seeded.variant_id).await, 30);
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let err = ctx
        .services
        .production
        .create_production_order(CreateProductionOrderInput {
            items: vec![],
            notes: None,
            created_by: actor(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ctx
        .services
        .production
        .create_production_order(order_input(uuid::Uuid::new_v4(), 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn listing_filters_by_status() {
    let ctx = setup().await;
    let seeded = seed_variant(&ctx, 20, 5, None, dec!(100)).await;

    let pending = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 4))
        .await
        .unwrap();
    let completed = ctx
        .services
        .production
        .create_production_order(order_input(seeded.variant_id, 6))
        .await
        .unwrap();
    ctx.services
        .production
        .complete_production_order(completed.transaction.id, actor())
        .await
        .unwrap();

    let (orders, total) = ctx
        .services
        .production
        .list_production_orders(Some(TransactionStatus::Pending), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].id, pending.transaction.id);

    let (_, total_all) = ctx
        .services
        .production
        .list_production_orders(None, 1, 10)
        .await
        .unwrap();
    assert_eq!(total_all, 2);
}
