// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use atelier_api::{
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{
        product_variant::{self, Entity as ProductVariant},
        stock_movement::{self, Entity as StockMovement},
    },
    events::EventSender,
    handlers::AppServices,
    services::catalog::{CreateProductInput, CreateVariantInput},
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness over an in-memory SQLite database with the full service
/// container. A single pooled connection keeps every query on the same
/// in-memory database.
pub struct TestContext {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub event_sender: EventSender,
}

impl TestContext {
    /// Clone of the event sender wired into the services.
    pub fn services_event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }
}

pub async fn setup() -> TestContext {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&config)
        .await
        .expect("failed to create test database");
    run_migrations(&db).await.expect("failed to run migrations");
    let db = Arc::new(db);

    // Drain events so senders never block on a full channel.
    let (tx, mut rx) = mpsc::channel(256);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let event_sender = EventSender::new(tx);
    let services = AppServices::new(db.clone(), Arc::new(event_sender.clone()));

    TestContext {
        db,
        services,
        event_sender,
    }
}

pub struct SeededVariant {
    pub product_id: Uuid,
    pub variant_id: Uuid,
}

/// Creates a product with a single size/color variant and the given stock
/// levels and prices.
pub async fn seed_variant(
    ctx: &TestContext,
    stock: i32,
    min_stock: i32,
    variant_price: Option<Decimal>,
    product_price: Decimal,
) -> SeededVariant {
    let size = ctx
        .services
        .catalog
        .create_size("M".to_string())
        .await
        .expect("failed to create size");
    let color = ctx
        .services
        .catalog
        .create_color("Navy".to_string())
        .await
        .expect("failed to create color");

    let created = ctx
        .services
        .catalog
        .create_product(CreateProductInput {
            name: "Kemeja Batik".to_string(),
            category: Some("Shirts".to_string()),
            description: None,
            price: product_price,
            variants: vec![CreateVariantInput {
                size_id: size.id,
                color_id: color.id,
                initial_stock: stock,
                min_stock,
                price: variant_price,
                barcode: None,
            }],
        })
        .await
        .expect("failed to create product");

    SeededVariant {
        product_id: created.product.id,
        variant_id: created.variants[0].id,
    }
}

/// Adds another variant (new size/color pair) to an existing product.
pub async fn seed_sibling_variant(
    ctx: &TestContext,
    product_id: Uuid,
    stock: i32,
    min_stock: i32,
    variant_price: Option<Decimal>,
) -> Uuid {
    let size = ctx
        .services
        .catalog
        .create_size("L".to_string())
        .await
        .expect("failed to create size");
    let color = ctx
        .services
        .catalog
        .create_color("Maroon".to_string())
        .await
        .expect("failed to create color");

    let now = chrono::Utc::now();
    let variant = product_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        size_id: Set(size.id),
        color_id: Set(color.id),
        stock: Set(stock),
        min_stock: Set(min_stock),
        price: Set(variant_price),
        barcode: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let variant = variant
        .insert(ctx.db.as_ref())
        .await
        .expect("failed to insert sibling variant");
    variant.id
}

pub async fn variant_stock(ctx: &TestContext, variant_id: Uuid) -> i32 {
    ProductVariant::find_by_id(variant_id)
        .one(ctx.db.as_ref())
        .await
        .expect("failed to load variant")
        .expect("variant missing")
        .stock
}

/// All movements for a variant, oldest first.
pub async fn movements_for(ctx: &TestContext, variant_id: Uuid) -> Vec<stock_movement::Model> {
    StockMovement::find()
        .filter(stock_movement::Column::VariantId.eq(variant_id))
        .order_by_asc(stock_movement::Column::CreatedAt)
        .all(ctx.db.as_ref())
        .await
        .expect("failed to load movements")
}

pub fn actor() -> Uuid {
    Uuid::new_v4()
}
